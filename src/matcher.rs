//! Span-level match and placeholder-extraction primitives.
//!
//! Every transform stage in the render pipeline works on flat strings. The
//! helpers here let a stage locate spans together with their byte offsets, or
//! lift already-parsed spans out of the text behind sentinel tokens so that a
//! later naive split (e.g. on `|`) cannot be confused by delimiter characters
//! inside a protected span. `restore_blocks` is the exact inverse of
//! `extract_blocks`.

use regex::Regex;

/// A single non-overlapping match with its byte offset into the haystack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpan {
    pub text: String,
    pub start: usize,
}

impl MatchSpan {
    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }
}

/// Find every non-overlapping match, left to right, resuming immediately
/// after each match's end so abutting matches are all found.
pub fn match_all(text: &str, pattern: &Regex) -> Vec<MatchSpan> {
    pattern
        .find_iter(text)
        .map(|m| MatchSpan {
            text: m.as_str().to_string(),
            start: m.start(),
        })
        .collect()
}

/// A span lifted out of the text, keyed by the sentinel that replaced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub placeholder: String,
    pub original: String,
}

/// Result of [`extract_blocks`]: the rewritten text plus the extracted spans
/// in source order.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    pub blocks: Vec<Block>,
}

/// Replace every match of `pattern` with a unique sentinel token
/// (`####PREFIX0001####`, zero-padded to at least four digits) and return the
/// rewritten text with the extracted spans.
///
/// One level of nested extraction is supported: extracting from text that
/// already contains sentinels of a different prefix leaves those sentinels
/// intact, and restoring in reverse order of extraction recovers the input.
pub fn extract_blocks(text: &str, pattern: &Regex, prefix: &str) -> Extraction {
    let mut blocks: Vec<Block> = Vec::new();
    let mut out = String::with_capacity(text.len());
    let mut last = 0usize;
    for m in pattern.find_iter(text) {
        out.push_str(&text[last..m.start()]);
        let placeholder = format!("####{}{:04}####", prefix, blocks.len() + 1);
        out.push_str(&placeholder);
        blocks.push(Block {
            placeholder,
            original: m.as_str().to_string(),
        });
        last = m.end();
    }
    out.push_str(&text[last..]);
    Extraction { text: out, blocks }
}

/// Substitute sentinels back to their original text.
pub fn restore_blocks(text: &str, blocks: &[Block]) -> String {
    let mut out = text.to_string();
    for block in blocks {
        out = out.replacen(&block.placeholder, &block.original, 1);
    }
    out
}
