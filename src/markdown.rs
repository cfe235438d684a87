//! Terminal Markdown->HTML stage and save-time typography.
//!
//! Smart-quote substitution runs once, when a body is saved, never at render
//! time; historical versions keep the punctuation the author saw. Code spans
//! and fenced blocks are left untouched.

use pulldown_cmark::{Options, Parser, html};

/// Convert fully expanded, link-resolved markup to HTML.
pub fn to_html(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(text, options);
    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Replace straight quotes with typographic ones.
///
/// A quote opens after start-of-text, whitespace, or an opening bracket;
/// otherwise it closes. A `'` between two alphanumerics is an apostrophe.
/// Backtick code spans and ``` fences pass through verbatim.
pub fn smart_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut in_fence = false;
    let mut in_code = false;
    let mut i = 0usize;

    while i < chars.len() {
        let ch = chars[i];
        let at_line_start = i == 0 || chars[i - 1] == '\n';

        if at_line_start && chars[i..].starts_with(&['`', '`', '`']) {
            in_fence = !in_fence;
            out.push_str("```");
            i += 3;
            continue;
        }
        if ch == '`' && !in_fence {
            in_code = !in_code;
            out.push(ch);
            i += 1;
            continue;
        }
        if in_fence || in_code {
            out.push(ch);
            i += 1;
            continue;
        }

        let prev = if i > 0 { Some(chars[i - 1]) } else { None };
        let next = chars.get(i + 1).copied();
        match ch {
            '"' => {
                if opens_quote(prev) {
                    out.push('\u{201C}');
                } else {
                    out.push('\u{201D}');
                }
            }
            '\'' => {
                let apostrophe = prev.is_some_and(|p| p.is_alphanumeric())
                    && next.is_some_and(|n| n.is_alphanumeric());
                if apostrophe {
                    out.push('\u{2019}');
                } else if opens_quote(prev) {
                    out.push('\u{2018}');
                } else {
                    out.push('\u{2019}');
                }
            }
            _ => out.push(ch),
        }
        i += 1;
    }
    out
}

fn opens_quote(prev: Option<char>) -> bool {
    match prev {
        None => true,
        Some(p) => p.is_whitespace() || matches!(p, '(' | '[' | '{' | '=' | '-'),
    }
}
