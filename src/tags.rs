//! Generic bracketed-tag strip/unwrap pass.
//!
//! Used for transclusion markers: `<includeonly>` content is dropped when a
//! page renders on its own, `<noinclude>` content is dropped when a template
//! body is transcluded elsewhere. The tag token must match case-sensitively
//! and exactly; unterminated pairs pass through as literal text.

use regex::Regex;

/// Tag dropped from a page's own render; its content belongs only inside
/// transclusions.
pub const INCLUDE_ONLY: &str = "includeonly";

/// Tag dropped from transcluded template bodies; its content belongs only on
/// the template page itself.
pub const NO_INCLUDE: &str = "noinclude";

/// Remove `<tag>...</tag>` pairs. By default the tag and its contents are
/// deleted entirely; with `unwrap` only the delimiters are removed and the
/// inner content stays in place.
///
/// `tag` may be given bare (`"spoiler"`) or wrapped (`"<spoiler>"`).
pub fn render_tags(text: &str, tag: &str, unwrap: bool) -> String {
    let token = tag.trim_start_matches('<').trim_end_matches('>');
    if token.is_empty() {
        return text.to_string();
    }
    let escaped = regex::escape(token);
    let Ok(re) = Regex::new(&format!(r"(?s)<{escaped}>(.*?)</{escaped}>")) else {
        return text.to_string();
    };
    if unwrap {
        re.replace_all(text, "$1").into_owned()
    } else {
        re.replace_all(text, "").into_owned()
    }
}
