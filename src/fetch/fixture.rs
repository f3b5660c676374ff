//! In-memory fetcher over HTML fixtures for crawl and pipeline tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{Fetcher, Page, SiteProfile};
use crate::error::FetchError;

#[derive(Default)]
pub struct FixtureFetcher {
    pages: HashMap<String, String>,
    errors: HashMap<String, FetchError>,
    /// URLs that fail with a timeout on their first request only.
    flaky: HashSet<String>,
    /// Requesting one of these URLs cancels the token; the fetch itself completes.
    cancel_on: HashMap<String, CancellationToken>,
    panics: HashSet<String>,
    requests: Mutex<Vec<String>>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    pub fn error(mut self, url: &str, err: FetchError) -> Self {
        self.errors.insert(url.to_string(), err);
        self
    }

    pub fn flaky(mut self, url: &str) -> Self {
        self.flaky.insert(url.to_string());
        self
    }

    pub fn cancel_on(mut self, url: &str, token: &CancellationToken) -> Self {
        self.cancel_on.insert(url.to_string(), token.clone());
        self
    }

    pub fn panics(mut self, url: &str) -> Self {
        self.panics.insert(url.to_string());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl Fetcher for FixtureFetcher {
    async fn fetch(&self, url: &str, _profile: &SiteProfile) -> Result<Page, FetchError> {
        let first_request = {
            let mut requests = self.requests.lock().unwrap();
            let first = !requests.iter().any(|u| u == url);
            requests.push(url.to_string());
            first
        };
        if let Some(token) = self.cancel_on.get(url) {
            token.cancel();
        }
        if self.panics.contains(url) {
            panic!("fixture fetch of {} panicked", url);
        }
        if first_request && self.flaky.contains(url) {
            return Err(FetchError::Timeout);
        }
        if let Some(err) = self.errors.get(url) {
            return Err(err.clone());
        }
        self.pages
            .get(url)
            .map(|body| Page { url: url.to_string(), body: body.clone() })
            .ok_or(FetchError::HttpStatus(404))
    }
}

/// Newegg-shaped listing page.
pub fn listing(tiles: &[&str], next: Option<&str>) -> String {
    let mut html = String::from("<html><body>");
    for href in tiles {
        html.push_str(&format!(
            r#"<div class="item-cell"><a class="item-title" href="{}">tile</a></div>"#,
            href
        ));
    }
    if let Some(next) = next {
        html.push_str(&format!(
            r#"<div class="list-tool-pagination"><a aria-label="Next" href="{}">Next</a></div>"#,
            next
        ));
    }
    html.push_str("</body></html>");
    html
}

/// Newegg-shaped detail page.
pub fn detail(title: &str, rows: &[(&str, &str)]) -> String {
    let mut html = format!(
        r#"<html><body><h1 class="product-title">{}</h1><div id="product-details"><table class="table-horizontal">"#,
        title
    );
    for (label, value) in rows {
        html.push_str(&format!("<tr><th>{}</th><td>{}</td></tr>", label, value));
    }
    html.push_str("</table></div></body></html>");
    html
}
