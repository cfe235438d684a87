//! Wiki-link resolution against a viewer-scoped page store.
//!
//! `[[Target]]` and `[[Target|Text]]` become anchors to existing pages, or
//! `create` stubs for pages nobody has written yet. `File:`/`Image:` and
//! `Category:` forms are reserved for the dedicated embed/category passes
//! and are left alone here; a leading `:` escapes that reservation.

use crate::page::{PageStore, StoreError};
use crate::pov::Viewer;
use crate::secret::{Enclosure, enclosing_secret};

/// A resolved link occurrence. Transient: consumed to build HTML and to
/// report which links sit inside secret spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRef {
    pub target: String,
    /// Path of the resolved page, or `None` for a not-yet-created target.
    pub resolved: Option<String>,
    pub text: String,
    /// Whether the link's span lies inside a secret of the *input* text.
    pub secret: Enclosure,
}

/// Result of a link pass over one body.
#[derive(Debug, Clone)]
pub struct LinkOutcome {
    pub text: String,
    pub links: Vec<LinkRef>,
}

/// Rewrite every plain `[[...]]` occurrence into an anchor.
///
/// An anchor immediately followed by bare word characters absorbs them into
/// its text (`[[save]]d` links the whole word `saved`), so partial-word
/// links never render broken.
pub fn resolve_links(
    text: &str,
    store: &dyn PageStore,
    viewer: &Viewer,
) -> Result<LinkOutcome, StoreError> {
    let mut out = String::with_capacity(text.len());
    let mut links: Vec<LinkRef> = Vec::new();
    let mut i = 0usize;

    while let Some(rel) = text[i..].find("[[") {
        let start = i + rel;
        out.push_str(&text[i..start]);

        let Some(close_rel) = text[start + 2..].find("]]") else {
            // unbalanced brackets stay literal.
            out.push_str(&text[start..]);
            return Ok(LinkOutcome { text: out, links });
        };
        let inner = &text[start + 2..start + 2 + close_rel];
        let mut end = start + 2 + close_rel + 2;

        if has_reserved_prefix(inner) {
            out.push_str(&text[start..end]);
            i = end;
            continue;
        }

        let (target_part, label_part) = match inner.split_once('|') {
            Some((t, l)) => (t, Some(l)),
            None => (inner, None),
        };
        let mut target = target_part.trim();
        // a leading ':' escapes namespace reservation and is dropped.
        if let Some(stripped) = target.strip_prefix(':') {
            target = stripped.trim_start();
        }

        let mut display = label_part
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(target)
            .to_string();

        // affix trailing word characters into the anchor text.
        let trail: usize = text[end..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .count();
        if trail > 0 {
            display.push_str(&text[end..end + trail]);
            end += trail;
        }

        let resolved = store.find_by_title(target, viewer)?;
        match &resolved {
            Some(page) => {
                out.push_str(&format!(
                    "<a href=\"/{}\" title=\"{}\">{}</a>",
                    page.path,
                    html_escape::encode_double_quoted_attribute(&page.title),
                    html_escape::encode_text(&display),
                ));
            }
            None => {
                out.push_str(&format!(
                    "<a href=\"/create?title={}\" class=\"new\">{}</a>",
                    urlencoding::encode(target),
                    html_escape::encode_text(&display),
                ));
            }
        }

        links.push(LinkRef {
            target: target.to_string(),
            resolved: resolved.map(|p| p.path),
            text: display,
            secret: enclosing_secret(text, start, 2 + close_rel + 2),
        });
        i = end;
    }

    out.push_str(&text[i..]);
    Ok(LinkOutcome { text: out, links })
}

/// Rewrite `[[Category:Name]]` occurrences into anchors to the category
/// page. Membership listing lives behind the store contract; this pass only
/// links the tag. Sort keys (`[[Category:Name|Sort]]`) are dropped from the
/// rendered text.
pub fn resolve_category_links(
    text: &str,
    store: &dyn PageStore,
    viewer: &Viewer,
) -> Result<String, StoreError> {
    let mut out = String::with_capacity(text.len());
    let mut i = 0usize;

    while let Some(rel) = text[i..].find("[[") {
        let start = i + rel;
        out.push_str(&text[i..start]);

        let Some(close_rel) = text[start + 2..].find("]]") else {
            out.push_str(&text[start..]);
            return Ok(out);
        };
        let inner = &text[start + 2..start + 2 + close_rel];
        let end = start + 2 + close_rel + 2;

        let inner_trim = inner.trim_start();
        if !starts_with_ignore_case(inner_trim, "category:") {
            out.push_str(&text[start..end]);
            i = end;
            continue;
        }

        let rest = &inner_trim["category:".len()..];
        let name = match rest.split_once('|') {
            Some((n, _sort)) => n.trim(),
            None => rest.trim(),
        };
        let title = format!("Category:{}", name);
        match store.find_by_title(&title, viewer)? {
            Some(page) => out.push_str(&format!(
                "<a href=\"/{}\" title=\"{}\">{}</a>",
                page.path,
                html_escape::encode_double_quoted_attribute(&page.title),
                html_escape::encode_text(name),
            )),
            None => out.push_str(&format!(
                "<a href=\"/create?title={}\" class=\"new\">{}</a>",
                urlencoding::encode(&title),
                html_escape::encode_text(name),
            )),
        }
        i = end;
    }

    out.push_str(&text[i..]);
    Ok(out)
}

fn has_reserved_prefix(inner: &str) -> bool {
    let trimmed = inner.trim_start();
    ["category:", "file:", "image:"]
        .iter()
        .any(|p| starts_with_ignore_case(trimmed, p))
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}
