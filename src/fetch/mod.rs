//! Fetch backend: one `fetch(url, profile)` surface over a plain HTTP client
//! and a headless-browser renderer, picked per site.

pub mod http_client;
pub mod render;

#[cfg(test)]
pub(crate) mod fixture;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{AppConfig, FetchMode, SiteConfig};
use crate::error::FetchError;

pub use http_client::HttpClient;
pub use render::RenderBackend;

/// A fetched HTML document. `url` is the final URL after redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub url: String,
    pub body: String,
}

/// What the fetch layer needs to know about the site a URL belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteProfile {
    pub site: String,
    pub mode: FetchMode,
}

impl SiteProfile {
    pub fn http(site: impl Into<String>) -> Self {
        Self { site: site.into(), mode: FetchMode::Http }
    }
}

impl From<&SiteConfig> for SiteProfile {
    fn from(site: &SiteConfig) -> Self {
        Self {
            site: site.name.clone(),
            mode: site.fetch_mode,
        }
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, profile: &SiteProfile) -> Result<Page, FetchError>;
}

// ── Anti-bot detection ───────────────────────────────────────────────────────

const CHALLENGE_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "challenge-platform",
    "Attention Required! | Cloudflare",
    "captcha-delivery.com",
    "px-captcha",
    "Pardon Our Interruption",
];

/// A 200 response that is really an interstitial challenge page.
pub(crate) fn looks_blocked(body: &str) -> bool {
    CHALLENGE_MARKERS.iter().any(|m| body.contains(m))
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

/// Routes each request to HTTP or the renderer according to the site profile.
pub struct FetchBackend {
    http: HttpClient,
    render: Arc<RenderBackend>,
}

impl FetchBackend {
    pub fn new(config: &AppConfig, render: Arc<RenderBackend>) -> anyhow::Result<Self> {
        Ok(Self {
            http: HttpClient::new(&config.scraper)?,
            render,
        })
    }

    pub fn render_backend(&self) -> &Arc<RenderBackend> {
        &self.render
    }
}

#[async_trait]
impl Fetcher for FetchBackend {
    async fn fetch(&self, url: &str, profile: &SiteProfile) -> Result<Page, FetchError> {
        match profile.mode {
            FetchMode::Http => self.http.fetch(url).await,
            FetchMode::Render => {
                let body = self.render.render(url).await?;
                if looks_blocked(&body) {
                    return Err(FetchError::Blocked);
                }
                Ok(Page { url: url.to_string(), body })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_pages_detected() {
        assert!(looks_blocked(
            "<html><title>Attention Required! | Cloudflare</title></html>"
        ));
        assert!(looks_blocked(r#"<script src="https://ct.captcha-delivery.com/c.js"></script>"#));
        assert!(!looks_blocked("<h1 class=\"product-title\">AMD Ryzen 5 7600</h1>"));
    }

    #[test]
    fn test_profile_from_site_config() {
        let cfg = AppConfig::default();
        let profile = SiteProfile::from(cfg.site("xkom-motherboard").unwrap());
        assert_eq!(profile.mode, FetchMode::Render);
        assert_eq!(SiteProfile::http("newegg-cpu").mode, FetchMode::Http);
    }
}
