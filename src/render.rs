//! Per-viewer page rendering and the save pipeline.
//!
//! Stage order is load-bearing: secrets are filtered before links resolve,
//! so a link buried in a hidden secret is never evaluated, and the reserved
//! `File:`/`Category:` prefixes are handled before generic link parsing.
//!
//! Stored body
//!   -> (save time) smart quotes -> codename assignment
//!   -> (render time) shorthand-to-tag normalization -> template expansion
//!   -> transclusion-tag filtering -> secret filter (per viewer)
//!   -> file embeds -> category links -> wiki links -> Markdown -> HTML

use crate::codename::{self, Codenamer, SecretsMap, WordlistCodenamer};
use crate::config::WikiConfig;
use crate::embed::{self, SvgFetch};
use crate::links::{self, LinkRef};
use crate::markdown;
use crate::page::{KnowerMap, Page, PageStore, StoreError};
use crate::pov::{RevealRequest, RuleCheck, Viewer};
use crate::secret::{self, Secret};
use crate::tags::{self, INCLUDE_ONLY, NO_INCLUDE};
use crate::template::TemplateEngine;
use thiserror::Error;

/// Failures a render can surface. Markup content never raises; only
/// collaborator errors and an unknown page title do.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("page not found: {0}")]
    PageNotFound(String),
}

/// The finished render of one page for one viewer.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    /// Every wiki link the viewer-visible text contained.
    pub links: Vec<LinkRef>,
    /// The page's secrets with their persisted knower sets applied.
    pub secrets: Vec<Secret>,
}

/// Result of the save pipeline.
#[derive(Debug, Clone)]
pub struct SavedBody {
    /// Canonical body: typographic quotes applied, every shorthand secret
    /// carrying its codename marker.
    pub body: String,
    pub secrets: SecretsMap,
}

/// Sequences the transform stages for save and render.
pub struct Renderer<'a> {
    store: &'a dyn PageStore,
    rules: &'a dyn RuleCheck,
    svg: &'a dyn SvgFetch,
    config: &'a WikiConfig,
}

impl<'a> Renderer<'a> {
    pub fn new(
        store: &'a dyn PageStore,
        rules: &'a dyn RuleCheck,
        svg: &'a dyn SvgFetch,
        config: &'a WikiConfig,
    ) -> Renderer<'a> {
        Renderer {
            store,
            rules,
            svg,
            config,
        }
    }

    /// Save-time canonicalization: typography first, then codename
    /// assignment, so the attribute quotes typography curls are the ones the
    /// parser already accepts. Idempotent; re-saving changes nothing.
    pub fn save_body(&self, raw: &str) -> SavedBody {
        let mut namer = WordlistCodenamer::default();
        self.save_body_with(raw, &mut namer)
    }

    pub fn save_body_with(&self, raw: &str, codenamer: &mut dyn Codenamer) -> SavedBody {
        let typographic = markdown::smart_quotes(raw);
        let assigned = codename::assign_codenames(&typographic, codenamer);
        SavedBody {
            body: assigned.text,
            secrets: assigned.secrets,
        }
    }

    /// Render a page body for a viewer, optionally attempting an on-demand
    /// reveal first.
    pub fn render_page(
        &self,
        page: &Page,
        viewer: &Viewer,
        reveal: Option<&RevealRequest>,
    ) -> Result<RenderedPage, RenderError> {
        // normalize shorthand secrets into tags so one syntax flows through
        // the remaining stages.
        let mut namer = WordlistCodenamer::default();
        let text = codename::shorthand_to_tags(&page.body, &mut namer);

        // parse the secret set and apply the persisted knower sidecar.
        let knowers = self.store.load_knowers(&page.id)?;
        let mut namer = WordlistCodenamer::default();
        let mut secrets = Secret::parse_all(&text, &mut namer);
        for secret in &mut secrets {
            if let Some(ids) = knowers.get(&secret.codename) {
                secret.knowers = ids.clone();
            }
        }

        if let Some(request) = reveal {
            self.attempt_reveal(page, viewer, request, &mut secrets)?;
        }

        let engine = TemplateEngine::new(self.store, self.config);
        let text = engine.expand(&text, viewer)?;

        // the page's own view: includeonly content is for transclusions
        // only, noinclude delimiters drop away.
        let text = tags::render_tags(&text, INCLUDE_ONLY, false);
        let text = tags::render_tags(&text, NO_INCLUDE, true);

        let text = secret::filter_secrets(&text, &secrets, viewer);

        let text = embed::render_file_embeds(&text, self.store, viewer, self.svg)?;
        let text = links::resolve_category_links(&text, self.store, viewer)?;
        let outcome = links::resolve_links(&text, self.store, viewer)?;

        Ok(RenderedPage {
            html: markdown::to_html(&outcome.text),
            links: outcome.links,
            secrets,
        })
    }

    /// Render by title, resolving through the viewer-scoped store.
    pub fn render_title(
        &self,
        title: &str,
        viewer: &Viewer,
        reveal: Option<&RevealRequest>,
    ) -> Result<RenderedPage, RenderError> {
        let page = self
            .store
            .find_by_title(title, viewer)?
            .ok_or_else(|| RenderError::PageNotFound(title.to_string()))?;
        self.render_page(&page, viewer, reveal)
    }

    /// Evaluate a reveal request against the configured rule system and, on
    /// success, persist the grant through a set-union merge. Unknown
    /// codenames and failed checks are quiet no-ops.
    fn attempt_reveal(
        &self,
        page: &Page,
        viewer: &Viewer,
        request: &RevealRequest,
        secrets: &mut [Secret],
    ) -> Result<(), RenderError> {
        let Some(identity) = viewer.identity() else {
            return Ok(());
        };
        let Some(secret) = secrets.iter_mut().find(|s| s.codename == request.codename) else {
            return Ok(());
        };
        if !self.rules.check(&secret.conditions, &request.stats) {
            return Ok(());
        }
        if secret.reveal(viewer) {
            let mut update = KnowerMap::new();
            update
                .entry(secret.codename.clone())
                .or_default()
                .insert(identity.to_string());
            self.store.merge_knowers(&page.id, &update)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codename::SequentialCodenamer;
    use crate::embed::NoRemote;
    use crate::page::MemoryStore;
    use crate::pov::{CharacterStats, ThresholdCheck};

    fn renderer_parts() -> (WikiConfig, ThresholdCheck, NoRemote) {
        (WikiConfig::default(), ThresholdCheck, NoRemote)
    }

    fn stats(pairs: &[(&str, i64)]) -> CharacterStats {
        CharacterStats(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }

    #[test]
    fn save_body_is_idempotent() {
        let store = MemoryStore::new();
        let (config, rules, svg) = renderer_parts();
        let renderer = Renderer::new(&store, &rules, &svg, &config);

        let raw = "She said \"run\". ||the duke lies|| More.";
        let once = renderer.save_body(raw);
        let twice = renderer.save_body(&once.body);
        assert_eq!(once.body, twice.body);
        assert_eq!(once.secrets.len(), 1);
        assert!(once.body.contains('\u{201C}'));
    }

    #[test]
    fn render_hides_and_reveals_by_viewer() {
        let page = Page::new(
            "Duke",
            "The duke rules. <secret codename=\"Ghost\">He is dead.</secret>",
        );
        let store = MemoryStore::with_pages(vec![page.clone()]);
        let mut grant = KnowerMap::new();
        grant
            .entry("Ghost".to_string())
            .or_default()
            .insert("elena".to_string());
        store.merge_knowers(&page.id, &grant).unwrap();

        let (config, rules, svg) = renderer_parts();
        let renderer = Renderer::new(&store, &rules, &svg, &config);

        let anon = renderer.render_page(&page, &Viewer::Anonymous, None).unwrap();
        assert!(!anon.html.contains("He is dead."));

        let elena = Viewer::Character("elena".to_string());
        let known = renderer.render_page(&page, &elena, None).unwrap();
        assert!(known.html.contains("He is dead."));

        let lm = renderer.render_page(&page, &Viewer::Loremaster, None).unwrap();
        assert!(lm.html.contains("He is dead."));
    }

    #[test]
    fn links_inside_hidden_secrets_are_never_resolved() {
        let page = Page::new(
            "Plot",
            "Visit [[Tavern]]. <secret codename=\"X\">Then [[Hideout]].</secret>",
        );
        let store = MemoryStore::with_pages(vec![
            page.clone(),
            Page::new("Tavern", "ale"),
            Page::new("Hideout", "shh"),
        ]);
        let (config, rules, svg) = renderer_parts();
        let renderer = Renderer::new(&store, &rules, &svg, &config);

        let anon = renderer.render_page(&page, &Viewer::Anonymous, None).unwrap();
        assert!(anon.html.contains("Tavern"));
        assert!(!anon.html.contains("Hideout"));
        assert_eq!(anon.links.len(), 1);
    }

    #[test]
    fn successful_reveal_persists_through_union_merge() {
        let page = Page::new(
            "Crypt",
            "<secret codename=\"Bones\" conditions=\"lore>=14\">ancient kings</secret>",
        );
        let store = MemoryStore::with_pages(vec![page.clone()]);
        let (config, rules, svg) = renderer_parts();
        let renderer = Renderer::new(&store, &rules, &svg, &config);
        let elena = Viewer::Character("elena".to_string());

        // failed check: nothing persisted, nothing rendered.
        let request = RevealRequest {
            codename: "Bones".to_string(),
            stats: stats(&[("lore", 10)]),
        };
        let out = renderer.render_page(&page, &elena, Some(&request)).unwrap();
        assert!(!out.html.contains("ancient kings"));
        assert!(store.load_knowers(&page.id).unwrap().is_empty());

        // passing check: rendered now and on later plain renders.
        let request = RevealRequest {
            codename: "Bones".to_string(),
            stats: stats(&[("lore", 15)]),
        };
        let out = renderer.render_page(&page, &elena, Some(&request)).unwrap();
        assert!(out.html.contains("ancient kings"));
        let out = renderer.render_page(&page, &elena, None).unwrap();
        assert!(out.html.contains("ancient kings"));
    }

    #[test]
    fn reveal_of_unknown_codename_is_a_quiet_noop() {
        let page = Page::new("P", "<secret codename=\"A\">x</secret>");
        let store = MemoryStore::with_pages(vec![page.clone()]);
        let (config, rules, svg) = renderer_parts();
        let renderer = Renderer::new(&store, &rules, &svg, &config);
        let request = RevealRequest {
            codename: "Nope".to_string(),
            stats: CharacterStats::default(),
        };
        let elena = Viewer::Character("elena".to_string());
        assert!(renderer.render_page(&page, &elena, Some(&request)).is_ok());
    }

    #[test]
    fn shorthand_secrets_render_like_tagged_ones() {
        let store = MemoryStore::new();
        let (config, rules, svg) = renderer_parts();
        let renderer = Renderer::new(&store, &rules, &svg, &config);

        let mut namer = SequentialCodenamer::default();
        let saved = renderer.save_body_with("open ||::Veil:: hidden words|| end", &mut namer);
        let page = Page::new("Scroll", saved.body);

        let anon = renderer.render_page(&page, &Viewer::Anonymous, None).unwrap();
        assert!(!anon.html.contains("hidden words"));
        let lm = renderer.render_page(&page, &Viewer::Loremaster, None).unwrap();
        assert!(lm.html.contains("hidden words"));
    }

    #[test]
    fn full_pipeline_expands_templates_and_renders_markdown() {
        let store = MemoryStore::with_pages(vec![
            Page::new("Template:Intro", "Welcome to {{{1}}}."),
            Page::new("Port Town", "# {{Intro|Port Town}}\n\nSee [[Docks]]."),
        ]);
        let (config, rules, svg) = renderer_parts();
        let renderer = Renderer::new(&store, &rules, &svg, &config);

        let out = renderer
            .render_title("Port Town", &Viewer::Anonymous, None)
            .unwrap();
        assert!(out.html.contains("<h1>Welcome to Port Town.</h1>"));
        assert!(out.html.contains("class=\"new\""));
        assert_eq!(out.links.len(), 1);
        assert_eq!(out.links[0].target, "Docks");
    }

    #[test]
    fn missing_page_surfaces_not_found() {
        let store = MemoryStore::new();
        let (config, rules, svg) = renderer_parts();
        let renderer = Renderer::new(&store, &rules, &svg, &config);
        let err = renderer
            .render_title("Nowhere", &Viewer::Anonymous, None)
            .unwrap_err();
        assert!(matches!(err, RenderError::PageNotFound(_)));
    }
}
