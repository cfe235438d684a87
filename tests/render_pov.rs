use lorewiki::config::WikiConfig;
use lorewiki::embed::NoRemote;
use lorewiki::page::{FileInfo, KnowerMap, MemoryStore, Page, PageStore};
use lorewiki::pov::{CharacterStats, RevealRequest, ThresholdCheck, Viewer};
use lorewiki::render::Renderer;

fn character(id: &str) -> Viewer {
    Viewer::Character(id.to_string())
}

fn render_with(store: &MemoryStore, title: &str, viewer: &Viewer) -> String {
    let config = WikiConfig::default();
    let rules = ThresholdCheck;
    let renderer = Renderer::new(store, &rules, &NoRemote, &config);
    renderer.render_title(title, viewer, None).unwrap().html
}

#[test]
fn same_page_renders_differently_per_viewer() {
    let page = Page::new(
        "The Duke",
        "The duke rules the valley. <secret codename=\"Ghost\">He has been dead for \
         a year; a double sits the throne.</secret> His banner is a red hart.",
    );
    let store = MemoryStore::with_pages(vec![page.clone()]);
    let mut grant = KnowerMap::new();
    grant
        .entry("Ghost".to_string())
        .or_default()
        .insert("elena".to_string());
    store.merge_knowers(&page.id, &grant).unwrap();

    let anon = render_with(&store, "The Duke", &Viewer::Anonymous);
    assert!(anon.contains("red hart"));
    assert!(!anon.contains("double sits the throne"));

    let elena = render_with(&store, "The Duke", &character("elena"));
    assert!(elena.contains("double sits the throne"));

    let marcus = render_with(&store, "The Duke", &character("marcus"));
    assert!(!marcus.contains("double sits the throne"));

    let lm = render_with(&store, "The Duke", &Viewer::Loremaster);
    assert!(lm.contains("double sits the throne"));
}

#[test]
fn templates_conditionals_and_links_compose() {
    let store = MemoryStore::with_pages(vec![
        Page::new(
            "Template:NPC",
            "**{{{name}}}**{{#IF|title}}, {{{title}}}{{#ELSIF}}, a commoner{{#ENDIF}}",
        ),
        Page::new(
            "Cast",
            "{{NPC|name=Elena|title=Knight of the Vale}} and {{NPC|name=Old Tom}} \
             drink at the [[Broken Flagon]].",
        ),
        Page::new("Broken Flagon", "A tavern."),
    ]);

    let html = render_with(&store, "Cast", &Viewer::Anonymous);
    assert!(html.contains("<strong>Elena</strong>, Knight of the Vale"));
    assert!(html.contains("<strong>Old Tom</strong>, a commoner"));
    assert!(html.contains("<a href=\"/Broken_Flagon\" title=\"Broken Flagon\">Broken Flagon</a>"));
}

#[test]
fn secret_gated_template_content_stays_hidden() {
    let store = MemoryStore::with_pages(vec![
        Page::new("Template:Rumor", "whisper: {{{1}}}"),
        Page::new(
            "Tavern Talk",
            "Common news. <secret codename=\"Hush\">{{Rumor|the king is ill}}</secret>",
        ),
    ]);

    let anon = render_with(&store, "Tavern Talk", &Viewer::Anonymous);
    assert!(!anon.contains("whisper"));
    assert!(!anon.contains("the king is ill"));

    let lm = render_with(&store, "Tavern Talk", &Viewer::Loremaster);
    assert!(lm.contains("whisper: the king is ill"));
}

#[test]
fn file_embed_and_plain_markdown_flow_through() {
    let mut map_page = Page::new("File:Vale.png", "");
    map_page.file = Some(FileInfo {
        url: "/files/9/9a/Vale.png".to_string(),
        mimetype: "image/png".to_string(),
        size: 52_000,
    });
    let store = MemoryStore::with_pages(vec![
        map_page,
        Page::new("Vale", "# The Vale\n\n[[File:Vale.png|map of the vale]]\n\nPlain *prose*."),
    ]);

    let html = render_with(&store, "Vale", &Viewer::Anonymous);
    assert!(html.contains("<h1>The Vale</h1>"));
    assert!(html.contains("<img src=\"/files/9/9a/Vale.png\" alt=\"map of the vale\">"));
    assert!(html.contains("<em>prose</em>"));
}

#[test]
fn reveal_round_trip_grants_lasting_knowledge() {
    let page = Page::new(
        "Standing Stones",
        "Old stones. <secret codename=\"Song\" conditions=\"lore>=12\">They hum at \
         dusk.</secret>",
    );
    let store = MemoryStore::with_pages(vec![page.clone()]);
    let config = WikiConfig::default();
    let rules = ThresholdCheck;
    let renderer = Renderer::new(&store, &rules, &NoRemote, &config);
    let elena = character("elena");

    let request = RevealRequest {
        codename: "Song".to_string(),
        stats: CharacterStats([("lore".to_string(), 13)].into_iter().collect()),
    };
    let out = renderer.render_page(&page, &elena, Some(&request)).unwrap();
    assert!(out.html.contains("hum at dusk"));

    // knowledge persisted; no request needed next time.
    let again = renderer.render_page(&page, &elena, None).unwrap();
    assert!(again.html.contains("hum at dusk"));

    // other characters gained nothing.
    let marcus = renderer.render_page(&page, &character("marcus"), None).unwrap();
    assert!(!marcus.html.contains("hum at dusk"));
}

#[test]
fn viewer_scoped_store_turns_restricted_links_into_stubs() {
    let mut gm_page = Page::new("True History", "what really happened");
    gm_page.loremaster_only = true;
    let store = MemoryStore::with_pages(vec![
        gm_page,
        Page::new("Chronicle", "As told in [[True History]]."),
    ]);

    let anon = render_with(&store, "Chronicle", &Viewer::Anonymous);
    assert!(anon.contains("class=\"new\""));

    let lm = render_with(&store, "Chronicle", &Viewer::Loremaster);
    assert!(lm.contains("<a href=\"/True_History\""));
}
