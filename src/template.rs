//! Template resolution: `{{Name|params}}` invocations against the template
//! namespace, with ordered/named/defaulted parameters, inline `{{#IF}}`
//! conditionals, and cycle-guarded recursive expansion.
//!
//! Parameter strings are split on top-level `|` only; `[[...]]` spans are
//! lifted out behind placeholders first so pipes inside links never split a
//! parameter. Missing templates, cyclic includes, and over-deep nesting all
//! expand to the empty string rather than erroring.

use crate::config::WikiConfig;
use crate::matcher;
use crate::page::{Page, PageStore, StoreError};
use crate::pov::Viewer;
use crate::tags::{self, INCLUDE_ONLY, NO_INCLUDE};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\[[^\[\]]*\]\]").unwrap());

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\{([^{}]+?)\}\}\}").unwrap());

/// Parameters of one template invocation. `ordered` is 1-based and may be
/// sparse; explicit numeric keys (`2=value`) and positional arguments both
/// write into it, last write per slot winning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateParams {
    pub ordered: Vec<Option<String>>,
    pub named: BTreeMap<String, String>,
}

impl TemplateParams {
    /// Resolve a placeholder key: a positive integer addresses an ordered
    /// slot, anything else a named parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.trim();
        if let Ok(n) = key.parse::<usize>()
            && n >= 1
        {
            return self.ordered.get(n - 1).and_then(|v| v.as_deref());
        }
        self.named.get(key).map(|s| s.as_str())
    }

    fn set_ordered(&mut self, index: usize, value: String) {
        if self.ordered.len() < index {
            self.ordered.resize(index, None);
        }
        self.ordered[index - 1] = Some(value);
    }
}

/// A parsed `{{Name|...}}` occurrence. Transient: parsed fresh on every
/// render pass, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub params: TemplateParams,
}

/// Parse the text between `{{` and `}}` into a template invocation.
pub fn parse_invocation(inner: &str) -> Template {
    let extracted = matcher::extract_blocks(inner, &LINK_RE, "LNK");
    let pieces = split_top_level(&extracted.text);
    let name = matcher::restore_blocks(pieces[0], &extracted.blocks)
        .trim()
        .to_string();
    let params = parse_param_pieces(&pieces[1..], &extracted.blocks);
    Template { name, params }
}

/// Split a raw parameter string into ordered and named parameters.
///
/// Positional arguments take ordered slots 1, 2, ... in order of appearance;
/// an explicitly indexed argument (`2=value`) writes that slot directly and
/// does not advance the positional cursor. A key that parses as a positive
/// integer is an index, anything else is a name.
pub fn parse_params(raw: &str) -> TemplateParams {
    let extracted = matcher::extract_blocks(raw, &LINK_RE, "LNK");
    let pieces = split_top_level(&extracted.text);
    parse_param_pieces(&pieces, &extracted.blocks)
}

fn parse_param_pieces(pieces: &[&str], blocks: &[matcher::Block]) -> TemplateParams {
    let mut params = TemplateParams::default();
    let mut cursor = 1usize;
    for piece in pieces {
        match find_top_level_eq(piece) {
            None => {
                let value = matcher::restore_blocks(piece, blocks);
                params.set_ordered(cursor, value.trim().to_string());
                cursor += 1;
            }
            Some(eq) => {
                let key = piece[..eq].trim();
                let value = matcher::restore_blocks(&piece[eq + 1..], blocks);
                if let Ok(n) = key.parse::<usize>()
                    && n >= 1
                {
                    params.set_ordered(n, value.trim().to_string());
                } else {
                    params
                        .named
                        .insert(key.to_string(), value.trim().to_string());
                }
            }
        }
    }
    params
}

/// Split on `|` at brace depth zero. Link spans are already behind
/// placeholders when this runs, so only `{{...}}` nesting matters.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut i = 0usize;
    let bytes = s.as_bytes();
    while i < bytes.len() {
        if s[i..].starts_with("{{") {
            depth += 1;
            i += 2;
            continue;
        }
        if s[i..].starts_with("}}") {
            depth = depth.saturating_sub(1);
            i += 2;
            continue;
        }
        if depth == 0 && bytes[i] == b'|' {
            parts.push(&s[start..i]);
            start = i + 1;
        }
        i += 1;
    }
    parts.push(&s[start..]);
    parts
}

/// First `=` at brace depth zero, if any.
fn find_top_level_eq(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = 0usize;
    let bytes = s.as_bytes();
    while i < bytes.len() {
        if s[i..].starts_with("{{") {
            depth += 1;
            i += 2;
            continue;
        }
        if s[i..].starts_with("}}") {
            depth = depth.saturating_sub(1);
            i += 2;
            continue;
        }
        if depth == 0 && bytes[i] == b'=' {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Replace `{{{1}}}` / `{{{name}}}` placeholders from the parameter set.
/// Unresolved placeholders render as empty string.
pub fn substitute(body: &str, params: &TemplateParams) -> String {
    PLACEHOLDER_RE
        .replace_all(body, |caps: &regex::Captures| {
            params.get(&caps[1]).unwrap_or("").to_string()
        })
        .into_owned()
}

const IF_TOKEN: &str = "{{#IF|";
const ELSIF_TOKEN: &str = "{{#ELSIF}}";
const ENDIF_TOKEN: &str = "{{#ENDIF}}";

/// Evaluate `{{#IF|cond}}A{{#ELSIF}}B{{#ENDIF}}` blocks against a parameter
/// set. Conditions are `param` (present and non-empty) or `param=value`
/// (string equality on the resolved value). Blocks nest; the `#ELSIF` branch
/// is optional. Unterminated blocks pass through as literal text.
pub fn eval_conditionals(text: &str, params: &TemplateParams) -> String {
    let mut out = String::new();
    let mut i = 0usize;
    while let Some(rel) = text[i..].find(IF_TOKEN) {
        let start = i + rel;
        out.push_str(&text[i..start]);

        let cond_start = start + IF_TOKEN.len();
        let Some(cond_len) = text[cond_start..].find("}}") else {
            out.push_str(&text[start..]);
            return out;
        };
        let cond = &text[cond_start..cond_start + cond_len];
        let body_start = cond_start + cond_len + 2;

        let Some(branches) = find_branches(&text[body_start..]) else {
            out.push_str(&text[start..]);
            return out;
        };

        let then_branch = &text[body_start..body_start + branches.then_len];
        let else_branch = branches
            .else_range
            .map(|(s, e)| &text[body_start + s..body_start + e])
            .unwrap_or("");
        let chosen = if eval_condition(cond, params) {
            then_branch
        } else {
            else_branch
        };
        out.push_str(&eval_conditionals(chosen, params));
        i = body_start + branches.consumed;
    }
    out.push_str(&text[i..]);
    out
}

struct Branches {
    then_len: usize,
    else_range: Option<(usize, usize)>,
    consumed: usize,
}

/// Scan forward for the `{{#ELSIF}}`/`{{#ENDIF}}` belonging to an already
/// opened `{{#IF|`, tracking nested blocks by depth.
fn find_branches(s: &str) -> Option<Branches> {
    let mut depth = 0usize;
    let mut pos = 0usize;
    let mut elsif_at: Option<usize> = None;
    loop {
        let rem = &s[pos..];
        let next_if = rem.find(IF_TOKEN);
        let next_elsif = rem.find(ELSIF_TOKEN);
        let next_endif = rem.find(ENDIF_TOKEN)?;

        let nearest = [next_if, next_elsif, Some(next_endif)]
            .into_iter()
            .flatten()
            .min()
            .unwrap();

        if Some(nearest) == next_if {
            depth += 1;
            pos += nearest + IF_TOKEN.len();
            continue;
        }
        if Some(nearest) == next_elsif && depth == 0 {
            if elsif_at.is_none() {
                elsif_at = Some(pos + nearest);
            }
            pos += nearest + ELSIF_TOKEN.len();
            continue;
        }
        if Some(nearest) == next_elsif {
            pos += nearest + ELSIF_TOKEN.len();
            continue;
        }
        // endif
        if depth == 0 {
            let endif_pos = pos + next_endif;
            let (then_len, else_range) = match elsif_at {
                Some(e) => (e, Some((e + ELSIF_TOKEN.len(), endif_pos))),
                None => (endif_pos, None),
            };
            return Some(Branches {
                then_len,
                else_range,
                consumed: endif_pos + ENDIF_TOKEN.len(),
            });
        }
        depth -= 1;
        pos += next_endif + ENDIF_TOKEN.len();
    }
}

fn eval_condition(cond: &str, params: &TemplateParams) -> bool {
    let cond = cond.trim();
    match cond.split_once('=') {
        Some((name, expected)) => params.get(name) == Some(expected.trim()),
        None => params.get(cond).is_some_and(|v| !v.is_empty()),
    }
}

/// Find the byte length of the balanced `{{...}}` group that `s` starts with.
fn find_matching_braces(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = 0usize;
    while i < s.len() {
        let rem = &s[i..];
        if rem.starts_with("{{") {
            depth += 1;
            i += 2;
            continue;
        }
        if rem.starts_with("}}") {
            if depth == 0 {
                return None;
            }
            depth -= 1;
            i += 2;
            if depth == 0 {
                return Some(i);
            }
            continue;
        }
        let ch_len = rem.chars().next().map(|c| c.len_utf8()).unwrap_or(1);
        i += ch_len;
    }
    None
}

/// One entry of a recursive dependency listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDependency {
    pub id: String,
    pub name: String,
    pub path: String,
}

/// Recursive template expansion over a page store.
pub struct TemplateEngine<'a> {
    store: &'a dyn PageStore,
    config: &'a WikiConfig,
}

impl<'a> TemplateEngine<'a> {
    pub fn new(store: &'a dyn PageStore, config: &'a WikiConfig) -> TemplateEngine<'a> {
        TemplateEngine { store, config }
    }

    /// Expand every `{{...}}` occurrence in `text`, depth-first, left to
    /// right, against the viewer-scoped store.
    pub fn expand(&self, text: &str, viewer: &Viewer) -> Result<String, StoreError> {
        let mut visited = HashSet::new();
        self.expand_inner(text, viewer, &mut visited, 0)
    }

    fn expand_inner(
        &self,
        text: &str,
        viewer: &Viewer,
        visited: &mut HashSet<String>,
        depth: usize,
    ) -> Result<String, StoreError> {
        let mut out = String::with_capacity(text.len());
        let mut i = 0usize;
        while i < text.len() {
            let rem = &text[i..];
            if rem.starts_with("{{")
                && !rem.starts_with("{{{")
                && let Some(consumed) = find_matching_braces(rem)
            {
                let inner = &rem[2..consumed - 2];
                if !inner.trim_start().starts_with('#') {
                    out.push_str(&self.resolve(inner, viewer, visited, depth)?);
                    i += consumed;
                    continue;
                }
                // stray conditional tokens outside a template body stay put.
                out.push_str(&rem[..consumed]);
                i += consumed;
                continue;
            }
            let ch_len = rem.chars().next().map(|c| c.len_utf8()).unwrap_or(1);
            out.push_str(&rem[..ch_len]);
            i += ch_len;
        }
        Ok(out)
    }

    fn resolve(
        &self,
        inner: &str,
        viewer: &Viewer,
        visited: &mut HashSet<String>,
        depth: usize,
    ) -> Result<String, StoreError> {
        let template = parse_invocation(inner);
        let key = template.name.to_lowercase();

        // cyclic include or runaway nesting truncates to empty output.
        if visited.contains(&key) || depth >= self.config.max_template_depth {
            return Ok(String::new());
        }

        let title = self.qualified_title(&template.name);
        let Some(page) = self.store.find_by_title(&title, viewer)? else {
            return Ok(String::new());
        };

        // transcluded view of the body: noinclude content disappears,
        // includeonly content surfaces.
        let body = tags::render_tags(&page.body, NO_INCLUDE, false);
        let body = tags::render_tags(&body, INCLUDE_ONLY, true);

        let substituted = substitute(&body, &template.params);
        let conditioned = eval_conditionals(&substituted, &template.params);
        // parameter tokens that sat inside a kept conditional branch resolve
        // on this second pass.
        let resolved = substitute(&conditioned, &template.params);

        visited.insert(key.clone());
        let expanded = self.expand_inner(&resolved, viewer, visited, depth + 1)?;
        visited.remove(&key);
        Ok(expanded)
    }

    fn qualified_title(&self, name: &str) -> String {
        if name.contains(':') {
            name.to_string()
        } else {
            format!("{}:{}", self.config.template_namespace, name)
        }
    }

    /// Pages whose body textually references `{{name}}` or `{{name|...}}`.
    pub fn find_pages_that_use(
        &self,
        name: &str,
        viewer: &Viewer,
    ) -> Result<Vec<Page>, StoreError> {
        let re = Regex::new(&format!(r"\{{\{{\s*{}\s*[|}}]", regex::escape(name.trim())))
            .expect("escaped template name is a valid pattern");
        Ok(self
            .store
            .pages(viewer)?
            .into_iter()
            .filter(|p| re.is_match(&p.body))
            .collect())
    }

    /// Recursively enumerate every template `text` depends on, including
    /// templates referenced by those templates. Each template is listed once.
    pub fn dependencies(
        &self,
        text: &str,
        viewer: &Viewer,
    ) -> Result<Vec<TemplateDependency>, StoreError> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        self.collect_dependencies(text, viewer, &mut visited, &mut out)?;
        Ok(out)
    }

    fn collect_dependencies(
        &self,
        text: &str,
        viewer: &Viewer,
        visited: &mut HashSet<String>,
        out: &mut Vec<TemplateDependency>,
    ) -> Result<(), StoreError> {
        let mut i = 0usize;
        while i < text.len() {
            let rem = &text[i..];
            if rem.starts_with("{{")
                && !rem.starts_with("{{{")
                && let Some(consumed) = find_matching_braces(rem)
            {
                let inner = &rem[2..consumed - 2];
                if !inner.trim_start().starts_with('#') {
                    let template = parse_invocation(inner);
                    let key = template.name.to_lowercase();
                    if visited.insert(key) {
                        let title = self.qualified_title(&template.name);
                        if let Some(page) = self.store.find_by_title(&title, viewer)? {
                            out.push(TemplateDependency {
                                id: page.id.clone(),
                                name: template.name.clone(),
                                path: page.path.clone(),
                            });
                            self.collect_dependencies(&page.body, viewer, visited, out)?;
                        }
                    }
                }
                i += consumed;
                continue;
            }
            let ch_len = rem.chars().next().map(|c| c.len_utf8()).unwrap_or(1);
            i += ch_len;
        }
        Ok(())
    }
}
