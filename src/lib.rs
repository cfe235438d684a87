//! lorewiki: a campaign-wiki markup renderer.
//!
//! Page bodies mix prose with wiki markup: `[[links]]`, `{{templates}}` with
//! parameters and `{{#IF}}` conditionals, `[[File:...]]` embeds, and secret
//! spans visible only to the characters who know them. The render pipeline
//! turns a stored body into HTML for one point of view; the same source
//! renders differently per reader.

pub mod codename;
pub mod config;
pub mod dirstore;
pub mod embed;
pub mod links;
pub mod markdown;
pub mod matcher;
pub mod page;
pub mod pov;
pub mod remote;
pub mod render;
pub mod secret;
pub mod tags;
pub mod template;

use crate::config::WikiConfig;
use crate::dirstore::DirStore;
use crate::page::PageStore;
use crate::pov::{CharacterStats, RevealRequest, Viewer, rule_check_for};
use crate::remote::HttpSvgFetcher;
use crate::render::{RenderError, Renderer};
use crate::template::TemplateEngine;
use std::path::Path;

/// Options for a single CLI-style render over a directory-backed wiki.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Render as this character identity; loremaster ids from the config
    /// resolve to the loremaster view.
    pub viewer_id: Option<String>,
    /// Force the loremaster view.
    pub loremaster: bool,
    /// Attempt to reveal this secret codename before rendering.
    pub reveal: Option<String>,
    /// Stats backing the reveal's rule check.
    pub stats: Vec<(String, i64)>,
    /// Canonicalize and persist the body before rendering.
    pub save: bool,
}

fn resolve_viewer(config: &WikiConfig, opts: &RunOptions) -> Viewer {
    if opts.loremaster {
        return Viewer::Loremaster;
    }
    match &opts.viewer_id {
        Some(id) => Viewer::resolve(id, &config.loremaster_ids),
        None => Viewer::Anonymous,
    }
}

/// Render one page from the wiki rooted at `root` and return its HTML.
pub fn run(root: &Path, title: &str, opts: &RunOptions) -> Result<String, RenderError> {
    let config = WikiConfig::load(&root.join("lorewiki.yaml"))?;
    let store = DirStore::new(root);
    let rules = rule_check_for(&config.rule_system);
    let svg = HttpSvgFetcher::new(config.fetch_timeout_secs);
    let renderer = Renderer::new(&store, rules.as_ref(), &svg, &config);

    let viewer = resolve_viewer(&config, opts);

    if opts.save {
        // canonicalization needs the unscoped page, so look it up as the
        // loremaster regardless of who is rendering.
        let page = store
            .find_by_title(title, &Viewer::Loremaster)?
            .ok_or_else(|| RenderError::PageNotFound(title.to_string()))?;
        let saved = renderer.save_body(&page.body);
        let mut canonical = page.clone();
        canonical.body = saved.body;
        store.save_page(&canonical)?;
        eprintln!(
            "Saved {:?} ({} secret{}).",
            canonical.title,
            saved.secrets.len(),
            if saved.secrets.len() == 1 { "" } else { "s" }
        );
    }

    let reveal = opts.reveal.as_ref().map(|codename| RevealRequest {
        codename: codename.clone(),
        stats: CharacterStats(opts.stats.iter().map(|(k, v)| (k.clone(), *v)).collect()),
    });

    let rendered = renderer.render_title(title, &viewer, reveal.as_ref())?;
    Ok(rendered.html)
}

/// List the titles of pages whose bodies use the named template.
pub fn template_usage(root: &Path, name: &str) -> Result<Vec<String>, RenderError> {
    let config = WikiConfig::load(&root.join("lorewiki.yaml"))?;
    let store = DirStore::new(root);
    let engine = TemplateEngine::new(&store, &config);
    let pages = engine.find_pages_that_use(name, &Viewer::Loremaster)?;
    Ok(pages.into_iter().map(|p| p.title).collect())
}
