//! `[[File:...]]` / `[[Image:...]]` embedding.
//!
//! The referenced page is resolved by its exact title, namespace prefix
//! included. A page that cannot be resolved, or that carries no upload,
//! leaves the markup as literal text (no create stub, unlike plain links).
//! Rendering dispatches once on a media kind derived from the upload's MIME
//! type, so adding a new kind is a one-place change.

use crate::page::{FileInfo, PageStore, StoreError};
use crate::pov::Viewer;
use regex::Regex;
use std::sync::LazyLock;

static FILE_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[\[(File|Image):([^\[\]|]+)(?:\|([^\[\]]*))?\]\]").unwrap()
});

/// What an upload renders as, selected from its MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Svg,
    Audio,
    Video,
    Download,
}

impl MediaKind {
    pub fn from_mime(mime: &str) -> MediaKind {
        let mime = mime.trim();
        if mime.eq_ignore_ascii_case("image/svg+xml") {
            MediaKind::Svg
        } else if starts_with_ignore_case(mime, "image/") {
            MediaKind::Image
        } else if starts_with_ignore_case(mime, "audio/") {
            MediaKind::Audio
        } else if starts_with_ignore_case(mime, "video/") {
            MediaKind::Video
        } else {
            MediaKind::Download
        }
    }
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Remote SVG content provider. Failures degrade to `None`; the embed is
/// then omitted from the render.
pub trait SvgFetch {
    fn fetch_svg(&self, url: &str) -> Option<String>;
}

/// Disabled remote fetching; every SVG embed renders as nothing.
pub struct NoRemote;

impl SvgFetch for NoRemote {
    fn fetch_svg(&self, _url: &str) -> Option<String> {
        None
    }
}

/// Rewrite every file/image link into its embed HTML.
pub fn render_file_embeds(
    text: &str,
    store: &dyn PageStore,
    viewer: &Viewer,
    svg: &dyn SvgFetch,
) -> Result<String, StoreError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0usize;
    for caps in FILE_LINK_RE.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        out.push_str(&text[last..whole.start()]);
        last = whole.end();

        let name = caps[2].trim();
        let title = format!("{}:{}", &caps[1], name);
        let alt = caps
            .get(3)
            .map(|m| m.as_str().trim())
            .filter(|a| !a.is_empty())
            .unwrap_or(name);

        let page = store.find_by_title(&title, viewer)?;
        match page.as_ref().and_then(|p| p.file.as_ref()) {
            Some(file) => out.push_str(&render_media(file, alt, svg)),
            // unresolved or fileless page: keep the literal markup.
            None => out.push_str(whole.as_str()),
        }
    }
    out.push_str(&text[last..]);
    Ok(out)
}

fn render_media(file: &FileInfo, alt: &str, svg: &dyn SvgFetch) -> String {
    let url = html_escape::encode_double_quoted_attribute(&file.url);
    let alt_attr = html_escape::encode_double_quoted_attribute(alt);
    let alt_text = html_escape::encode_text(alt);
    match MediaKind::from_mime(&file.mimetype) {
        MediaKind::Image => format!("<img src=\"{}\" alt=\"{}\">", url, alt_attr),
        MediaKind::Svg => svg.fetch_svg(&file.url).unwrap_or_default(),
        MediaKind::Audio => format!(
            "<audio controls src=\"{}\"><a href=\"{}\">{}</a></audio>",
            url, url, alt_text
        ),
        MediaKind::Video => format!(
            "<video controls><source src=\"{}\" type=\"{}\"><a href=\"{}\">{}</a></video>",
            url,
            html_escape::encode_double_quoted_attribute(&file.mimetype),
            url,
            alt_text
        ),
        MediaKind::Download => format!(
            "<a href=\"{}\" download>{} ({})</a>",
            url,
            alt_text,
            human_size(file.size)
        ),
    }
}

/// Human-readable file size, 1024-based.
pub fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for next in UNITS {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{:.1} {}", value, unit)
}
