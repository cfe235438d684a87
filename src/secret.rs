//! The secret model: spans of markup visible only to viewers who know them.
//!
//! Secrets appear in stored bodies as `<secret codename="X" conditions="Y">`
//! tags (the `||...||` shorthand is canonicalized into tags with codenames at
//! save time, see `codename`). Attribute quotes may be straight or curly
//! because save-time typography runs before tag parsing ever sees the text.
//!
//! Malformed tags (unterminated, mismatched) are simply not matched and pass
//! through as literal text.

use crate::codename::{Codenamer, SecretsMap};
use crate::pov::Viewer;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

static SECRET_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<secret\b([^>]*)>(.*?)</secret>").unwrap()
});

static CODENAME_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)codename\s*=\s*["“”]([^"“”]*)["“”]"#).unwrap()
});

static CONDITIONS_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)conditions\s*=\s*["“”]([^"“”]*)["“”]"#).unwrap()
});

/// How a secret is serialized back into markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretRender {
    /// Full wrapper with attributes and content; the canonical stored form.
    Full,
    /// Wrapper with empty content, for editing surfaces that must show the
    /// span exists without leaking it.
    Placeholder,
    /// Bare content, once the viewer is confirmed to know the secret.
    Reading,
}

/// A redactable span of markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    /// Unique within one rendering context; case-sensitive exact match.
    pub codename: String,

    /// Raw markup guarded by this secret (not yet rendered).
    pub content: String,

    /// Free-text rule expression evaluated by the configured game system when
    /// a viewer attempts an on-demand reveal.
    #[serde(default)]
    pub conditions: String,

    /// Character identities granted visibility.
    #[serde(default)]
    pub knowers: BTreeSet<String>,
}

impl Secret {
    pub fn new(codename: impl Into<String>, content: impl Into<String>) -> Secret {
        Secret {
            codename: codename.into(),
            content: content.into(),
            conditions: String::new(),
            knowers: BTreeSet::new(),
        }
    }

    /// Grant visibility to a viewer. Idempotent; anonymous and loremaster
    /// identities are never stored. Returns true when the set changed.
    pub fn reveal(&mut self, viewer: &Viewer) -> bool {
        match viewer.identity() {
            Some(id) => self.knowers.insert(id.to_string()),
            None => false,
        }
    }

    /// Membership test: loremaster always true, anonymous always false, a
    /// character by knower-set membership.
    pub fn knows(&self, viewer: &Viewer) -> bool {
        match viewer {
            Viewer::Loremaster => true,
            Viewer::Anonymous => false,
            Viewer::Character(id) => self.knowers.contains(id),
        }
    }

    /// Serialize back into markup.
    pub fn render(&self, mode: SecretRender) -> String {
        match mode {
            SecretRender::Reading => self.content.clone(),
            SecretRender::Full => self.wrap(&self.content),
            SecretRender::Placeholder => self.wrap(""),
        }
    }

    fn wrap(&self, content: &str) -> String {
        let codename = html_escape::encode_double_quoted_attribute(&self.codename);
        if self.conditions.trim().is_empty() {
            format!("<secret codename=\"{}\">{}</secret>", codename, content)
        } else {
            let conditions = html_escape::encode_double_quoted_attribute(&self.conditions);
            format!(
                "<secret codename=\"{}\" conditions=\"{}\">{}</secret>",
                codename, conditions, content
            )
        }
    }

    /// Scan `text` for `<secret ...>...</secret>` spans, first to last.
    ///
    /// Tags without a codename attribute get one minted through `codenamer`;
    /// minted names never collide with a codename already present anywhere in
    /// the text. Output order matches textual occurrence, which later stages
    /// rely on for index alignment.
    pub fn parse_all(text: &str, codenamer: &mut dyn Codenamer) -> Vec<Secret> {
        // seed the taken-name map with every explicit codename so minting
        // cannot collide with a name that appears later in the text.
        let mut taken: SecretsMap = SecretsMap::new();
        for caps in SECRET_TAG_RE.captures_iter(text) {
            if let Some(name) = attr_value(&CODENAME_ATTR_RE, &caps[1]) {
                taken.entry(name.clone()).or_insert_with(|| Secret::new(name, ""));
            }
        }

        let mut out: Vec<Secret> = Vec::new();
        for caps in SECRET_TAG_RE.captures_iter(text) {
            let attrs = &caps[1];
            let content = caps[2].to_string();
            let conditions = attr_value(&CONDITIONS_ATTR_RE, attrs).unwrap_or_default();
            let codename = match attr_value(&CODENAME_ATTR_RE, attrs) {
                Some(name) => name,
                None => {
                    let minted = codenamer.mint(&taken);
                    taken.insert(minted.clone(), Secret::new(minted.clone(), content.clone()));
                    minted
                }
            };
            out.push(Secret {
                codename,
                content,
                conditions,
                knowers: BTreeSet::new(),
            });
        }
        out
    }
}

fn attr_value(re: &Regex, attrs: &str) -> Option<String> {
    re.captures(attrs).map(|c| c[1].to_string())
}

/// Replace every secret tag in `text` according to what `viewer` may see:
/// known secrets keep their bare content, unknown ones disappear entirely.
///
/// Knowledge is looked up in `secrets` by codename; a tag whose codename is
/// not listed (e.g. one introduced mid-render by a template body) falls back
/// to its own attributes, so only the loremaster sees it.
pub fn filter_secrets(text: &str, secrets: &[Secret], viewer: &Viewer) -> String {
    SECRET_TAG_RE
        .replace_all(text, |caps: &regex::Captures| {
            let attrs = &caps[1];
            let content = &caps[2];
            let known = match attr_value(&CODENAME_ATTR_RE, attrs)
                .and_then(|name| secrets.iter().find(|s| s.codename == name))
            {
                Some(secret) => secret.knows(viewer),
                None => viewer.is_loremaster(),
            };
            if known { content.to_string() } else { String::new() }
        })
        .into_owned()
}

/// Where a located substring sits relative to the secret spans of `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enclosure {
    /// Fully inside a secret carrying this codename.
    Codename(String),
    /// Fully inside a secret that has no codename attribute.
    Unnamed,
    /// Outside every secret span.
    Outside,
}

/// Determine whether the span `[start, start+len)` is fully contained within
/// a secret tag's span. Containment is span-inclusive: the match must start
/// at or after, and end at or before, the enclosing secret's boundaries.
pub fn enclosing_secret(text: &str, start: usize, len: usize) -> Enclosure {
    let end = start + len;
    for caps in SECRET_TAG_RE.captures_iter(text) {
        let span = caps.get(0).expect("group 0 always participates");
        if start >= span.start() && end <= span.end() {
            return match attr_value(&CODENAME_ATTR_RE, &caps[1]) {
                Some(name) => Enclosure::Codename(name),
                None => Enclosure::Unnamed,
            };
        }
    }
    Enclosure::Outside
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codename::SequentialCodenamer;

    #[test]
    fn parses_bare_secret_with_empty_conditions() {
        let mut namer = SequentialCodenamer::default();
        let secrets = Secret::parse_all("<secret>the terrible secret</secret>", &mut namer);
        assert_eq!(secrets.len(), 1);
        assert_eq!(secrets[0].content, "the terrible secret");
        assert_eq!(secrets[0].conditions, "");
        assert!(!secrets[0].codename.is_empty());
    }

    #[test]
    fn parses_attributes_with_straight_and_curly_quotes() {
        let mut namer = SequentialCodenamer::default();
        let src = r#"<secret codename=“Ghost” conditions="lore>=14">hidden</secret>"#;
        let secrets = Secret::parse_all(src, &mut namer);
        assert_eq!(secrets.len(), 1);
        assert_eq!(secrets[0].codename, "Ghost");
        assert_eq!(secrets[0].conditions, "lore>=14");
    }

    #[test]
    fn parse_is_case_insensitive_and_multiline() {
        let mut namer = SequentialCodenamer::default();
        let src = "<SECRET codename=\"A\">line one\nline two</Secret>";
        let secrets = Secret::parse_all(src, &mut namer);
        assert_eq!(secrets.len(), 1);
        assert_eq!(secrets[0].content, "line one\nline two");
    }

    #[test]
    fn unterminated_tag_is_not_matched() {
        let mut namer = SequentialCodenamer::default();
        let secrets = Secret::parse_all("<secret codename=\"X\">never closed", &mut namer);
        assert!(secrets.is_empty());
    }

    #[test]
    fn minted_names_skip_explicit_codenames_later_in_text() {
        let mut namer = SequentialCodenamer::default();
        let src = "<secret>first</secret><secret codename=\"S1\">second</secret>";
        let secrets = Secret::parse_all(src, &mut namer);
        assert_eq!(secrets.len(), 2);
        assert_ne!(secrets[0].codename, secrets[1].codename);
    }

    #[test]
    fn reveal_is_idempotent_and_skips_special_viewers() {
        let mut s = Secret::new("X", "c");
        let elena = Viewer::Character("elena".to_string());
        assert!(s.reveal(&elena));
        assert!(!s.reveal(&elena));
        assert!(!s.reveal(&Viewer::Anonymous));
        assert!(!s.reveal(&Viewer::Loremaster));
        assert_eq!(s.knowers.len(), 1);
    }

    #[test]
    fn knows_invariants() {
        let mut s = Secret::new("X", "c");
        s.reveal(&Viewer::Character("elena".to_string()));
        assert!(s.knows(&Viewer::Loremaster));
        assert!(!s.knows(&Viewer::Anonymous));
        assert!(s.knows(&Viewer::Character("elena".to_string())));
        assert!(!s.knows(&Viewer::Character("marcus".to_string())));
    }

    #[test]
    fn render_modes() {
        let mut s = Secret::new("Ghost", "the duke lies");
        assert_eq!(
            s.render(SecretRender::Full),
            "<secret codename=\"Ghost\">the duke lies</secret>"
        );
        assert_eq!(
            s.render(SecretRender::Placeholder),
            "<secret codename=\"Ghost\"></secret>"
        );
        assert_eq!(s.render(SecretRender::Reading), "the duke lies");

        s.conditions = "lore>=14".to_string();
        assert_eq!(
            s.render(SecretRender::Full),
            "<secret codename=\"Ghost\" conditions=\"lore>=14\">the duke lies</secret>"
        );
    }

    #[test]
    fn enclosure_is_span_inclusive() {
        let src = "before <secret codename=\"A\">see [[Castle]] now</secret> after";
        let link_start = src.find("[[Castle]]").unwrap();
        assert_eq!(
            enclosing_secret(src, link_start, "[[Castle]]".len()),
            Enclosure::Codename("A".to_string())
        );
        assert_eq!(enclosing_secret(src, 0, 6), Enclosure::Outside);
        // span reaching past the closing tag is not contained.
        assert_eq!(enclosing_secret(src, link_start, src.len() - link_start), Enclosure::Outside);
    }

    #[test]
    fn enclosure_reports_unnamed_secrets() {
        let src = "<secret>plain [[Keep]] span</secret>";
        let start = src.find("[[Keep]]").unwrap();
        assert_eq!(enclosing_secret(src, start, "[[Keep]]".len()), Enclosure::Unnamed);
    }

    #[test]
    fn filter_keeps_known_and_omits_unknown() {
        let mut known = Secret::new("A", "visible part");
        known.reveal(&Viewer::Character("elena".to_string()));
        let unknown = Secret::new("B", "hidden part");
        let secrets = vec![known, unknown];

        let src = "x <secret codename=\"A\">visible part</secret> y \
                   <secret codename=\"B\">hidden part</secret> z";
        let elena = Viewer::Character("elena".to_string());
        assert_eq!(filter_secrets(src, &secrets, &elena), "x visible part y  z");
        assert_eq!(filter_secrets(src, &secrets, &Viewer::Anonymous), "x  y  z");
        assert_eq!(
            filter_secrets(src, &secrets, &Viewer::Loremaster),
            "x visible part y hidden part z"
        );
    }

    #[test]
    fn filter_falls_back_to_tag_for_unlisted_codenames() {
        let src = "<secret codename=\"Orphan\">stray</secret>";
        assert_eq!(filter_secrets(src, &[], &Viewer::Anonymous), "");
        assert_eq!(filter_secrets(src, &[], &Viewer::Loremaster), "stray");
    }
}
