//! Codename minting and the save-time `||...||` canonicalization pass.
//!
//! Shorthand secrets are rewritten in place to carry an explicit
//! `::Codename::` marker, so re-parsing a saved body is a no-op: applying
//! [`assign_codenames`] to its own output yields identical text.

use crate::matcher;
use crate::secret::Secret;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Secrets keyed by final codename.
pub type SecretsMap = BTreeMap<String, Secret>;

static SHORTHAND_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\|\|(.+?)\|\|").unwrap());

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^::([^:]+?):: ?").unwrap());

static TAG_CODENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<secret\b[^>]*codename\s*=\s*["“”]([^"“”]*)["“”][^>]*>"#).unwrap()
});

/// Mints fresh codenames, guaranteed unique against the map being built.
pub trait Codenamer {
    fn mint(&mut self, taken: &SecretsMap) -> String;
}

/// Two-word codenames from fixed lists (`Gilded Falcon`, `Silent Lantern`),
/// deterministic across runs so canonicalized bodies are reproducible. Falls
/// back to a numeric suffix once the combinations run out.
#[derive(Debug, Default)]
pub struct WordlistCodenamer {
    cursor: usize,
}

const ADJECTIVES: &[&str] = &[
    "Gilded", "Silent", "Crimson", "Hollow", "Ashen", "Veiled", "Iron", "Pale", "Sable", "Amber",
    "Broken", "Distant", "Errant", "Frozen", "Grim", "Hidden",
];

const NOUNS: &[&str] = &[
    "Falcon", "Lantern", "Crown", "Serpent", "Anvil", "Raven", "Chalice", "Gate", "Hound", "Key",
    "Mirror", "Oath", "Spire", "Thorn", "Vault", "Wolf",
];

impl Codenamer for WordlistCodenamer {
    fn mint(&mut self, taken: &SecretsMap) -> String {
        let combos = ADJECTIVES.len() * NOUNS.len();
        loop {
            let name = if self.cursor < combos {
                format!(
                    "{} {}",
                    ADJECTIVES[self.cursor % ADJECTIVES.len()],
                    NOUNS[self.cursor / ADJECTIVES.len()]
                )
            } else {
                format!("Secret {}", self.cursor - combos + 1)
            };
            self.cursor += 1;
            if !taken.contains_key(&name) {
                return name;
            }
        }
    }
}

/// Short sequential names (`S1`, `S2`, ...) for tests and tooling output.
#[derive(Debug, Default)]
pub struct SequentialCodenamer {
    cursor: usize,
}

impl Codenamer for SequentialCodenamer {
    fn mint(&mut self, taken: &SecretsMap) -> String {
        loop {
            self.cursor += 1;
            let name = format!("S{}", self.cursor);
            if !taken.contains_key(&name) {
                return name;
            }
        }
    }
}

/// Result of the canonicalization pass.
#[derive(Debug, Clone)]
pub struct Assigned {
    /// Re-serialized body; every shorthand secret carries its marker.
    pub text: String,
    /// Secrets discovered in shorthand spans, keyed by final codename.
    pub secrets: SecretsMap,
}

/// Scan for `||...||` shorthand secrets and assign codenames.
///
/// Spans starting with an explicit `::Codename::` marker keep it (the marker
/// is stripped from the stored content); spans without one get a minted name
/// and are rewritten to carry it. Minted names never collide with marker
/// names elsewhere in the text nor with codenames on `<secret>` tags.
pub fn assign_codenames(text: &str, codenamer: &mut dyn Codenamer) -> Assigned {
    // reserve every codename already present, shorthand or tag, before
    // minting anything.
    let mut taken = SecretsMap::new();
    for span in matcher::match_all(text, &SHORTHAND_RE) {
        let inner = &span.text[2..span.text.len() - 2];
        if let Some(caps) = MARKER_RE.captures(inner) {
            let name = caps[1].to_string();
            taken.entry(name.clone()).or_insert_with(|| Secret::new(name, ""));
        }
    }
    for caps in TAG_CODENAME_RE.captures_iter(text) {
        let name = caps[1].to_string();
        taken.entry(name.clone()).or_insert_with(|| Secret::new(name, ""));
    }

    let mut secrets = SecretsMap::new();
    let mut out = String::with_capacity(text.len());
    let mut last = 0usize;
    for m in SHORTHAND_RE.find_iter(text) {
        out.push_str(&text[last..m.start()]);
        last = m.end();

        let inner = &m.as_str()[2..m.as_str().len() - 2];
        let (codename, content) = match MARKER_RE.captures(inner) {
            Some(caps) => {
                let name = caps[1].to_string();
                (name, inner[caps.get(0).unwrap().end()..].to_string())
            }
            None => {
                let name = codenamer.mint(&taken);
                taken.insert(name.clone(), Secret::new(name.clone(), ""));
                (name, inner.to_string())
            }
        };

        out.push_str(&format!("||::{}:: {}||", codename, content));
        secrets.insert(codename.clone(), Secret::new(codename, content));
    }
    out.push_str(&text[last..]);

    Assigned { text: out, secrets }
}

/// Canonicalize shorthand spans and rewrite them as full `<secret>` tags,
/// the form the render-time passes operate on.
pub fn shorthand_to_tags(text: &str, codenamer: &mut dyn Codenamer) -> String {
    let assigned = assign_codenames(text, codenamer);
    SHORTHAND_RE
        .replace_all(&assigned.text, |caps: &regex::Captures| {
            let inner = &caps[1];
            match MARKER_RE.captures(inner) {
                Some(marker) => {
                    let content = &inner[marker.get(0).unwrap().end()..];
                    Secret::new(&marker[1], content).render(crate::secret::SecretRender::Full)
                }
                // canonicalization marks every span; anything else is not a
                // shorthand secret.
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Every codename present in a body, tag or shorthand form.
pub fn codenames_in(text: &str) -> std::collections::BTreeSet<String> {
    let mut out = std::collections::BTreeSet::new();
    for caps in TAG_CODENAME_RE.captures_iter(text) {
        out.insert(caps[1].to_string());
    }
    for m in SHORTHAND_RE.find_iter(text) {
        let inner = &m.as_str()[2..m.as_str().len() - 2];
        if let Some(caps) = MARKER_RE.captures(inner) {
            out.insert(caps[1].to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_marker_to_bare_shorthand() {
        let mut namer = SequentialCodenamer::default();
        let out = assign_codenames("a ||the duke lies|| b", &mut namer);
        assert_eq!(out.text, "a ||::S1:: the duke lies|| b");
        assert_eq!(out.secrets.len(), 1);
        assert_eq!(out.secrets["S1"].content, "the duke lies");
    }

    #[test]
    fn explicit_marker_wins_and_is_stripped_from_content() {
        let mut namer = SequentialCodenamer::default();
        let out = assign_codenames("||::Ghost:: the duke lies||", &mut namer);
        assert_eq!(out.text, "||::Ghost:: the duke lies||");
        assert_eq!(out.secrets["Ghost"].content, "the duke lies");
    }

    #[test]
    fn applying_twice_is_a_fixed_point() {
        let mut namer = SequentialCodenamer::default();
        let src = "x ||one|| y ||::Named:: two|| z ||three||";
        let once = assign_codenames(src, &mut namer);
        let mut namer2 = SequentialCodenamer::default();
        let twice = assign_codenames(&once.text, &mut namer2);
        assert_eq!(once.text, twice.text);
        assert_eq!(once.secrets, twice.secrets);
    }

    #[test]
    fn codenames_are_pairwise_distinct() {
        let mut namer = SequentialCodenamer::default();
        let out = assign_codenames("||a|| ||::S1:: b|| ||c||", &mut namer);
        // the explicit S1 marker is reserved before minting; the two bare
        // spans get fresh names.
        assert_eq!(out.secrets.len(), 3);
        let mut names: Vec<&String> = out.secrets.keys().collect();
        names.dedup();
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn minting_skips_secret_tag_codenames() {
        let mut namer = SequentialCodenamer::default();
        let src = "<secret codename=\"S1\">t</secret> ||bare||";
        let out = assign_codenames(src, &mut namer);
        assert!(out.secrets.contains_key("S2"), "{:?}", out.secrets.keys());
    }

    #[test]
    fn adjacent_spans_both_match() {
        let mut namer = SequentialCodenamer::default();
        let out = assign_codenames("||a||||b||", &mut namer);
        assert_eq!(out.secrets.len(), 2);
        assert_eq!(out.text, "||::S1:: a||||::S2:: b||");
    }

    #[test]
    fn shorthand_converts_to_full_tags() {
        let mut namer = SequentialCodenamer::default();
        let out = shorthand_to_tags("a ||::Ghost:: the duke lies|| b ||plain||", &mut namer);
        assert_eq!(
            out,
            "a <secret codename=\"Ghost\">the duke lies</secret> b \
             <secret codename=\"S1\">plain</secret>"
        );
    }

    #[test]
    fn codenames_in_sees_both_syntaxes() {
        let names = codenames_in("<secret codename=\"A\">x</secret> ||::B:: y|| ||bare||");
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["A".to_string(), "B".to_string()]
        );
    }

    #[test]
    fn wordlist_codenamer_is_deterministic_and_collision_free() {
        let mut namer = WordlistCodenamer::default();
        let mut taken = SecretsMap::new();
        let first = namer.mint(&taken);
        taken.insert(first.clone(), Secret::new(first.clone(), ""));

        // a fresh codenamer starts from the same cursor, so it must detect
        // the collision and advance.
        let mut fresh = WordlistCodenamer::default();
        assert_eq!(fresh.mint(&SecretsMap::new()), first);
        let mut fresh = WordlistCodenamer::default();
        let second = fresh.mint(&taken);
        assert_ne!(first, second);
    }
}
