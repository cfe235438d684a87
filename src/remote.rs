//! Remote SVG retrieval.
//!
//! Upload stores frequently hold SVGs behind a URL rather than inline; the
//! renderer inlines the `<svg>` element itself so pages stay self-contained.
//! Every failure path (timeout, bad status, unparsable body, no `<svg>`
//! element) degrades to `None` and the embed is omitted from the render.

use crate::embed::SvgFetch;
use scraper::{Html, Selector};
use std::time::Duration;

pub struct HttpSvgFetcher {
    timeout: Duration,
}

impl HttpSvgFetcher {
    pub fn new(timeout_secs: u64) -> HttpSvgFetcher {
        HttpSvgFetcher {
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl SvgFetch for HttpSvgFetcher {
    fn fetch_svg(&self, url: &str) -> Option<String> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .ok()?;
        let resp = client.get(url).send().ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let body = resp.text().ok()?;
        extract_svg_element(&body)
    }
}

/// Pull the `<svg>` element out of a fetched document, dropping the XML
/// prolog, doctype, and anything else around it.
pub fn extract_svg_element(document: &str) -> Option<String> {
    let parsed = Html::parse_document(document);
    let selector = Selector::parse("svg").ok()?;
    parsed.select(&selector).next().map(|el| el.html())
}
