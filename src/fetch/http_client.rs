use crate::config::ScraperConfig;
use crate::error::FetchError;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use super::{looks_blocked, Page};

pub struct HttpClient {
    inner: reqwest::Client,
    config: ScraperConfig,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    /// Fetch a URL with the polite delay, then retry transient failures with
    /// jittered exponential backoff.
    pub async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
        self.polite_delay().await;

        let backoff = ExponentialBackoff::from_millis(2)
            .factor((self.config.retry_backoff_ms / 2).max(1))
            .max_delay(Duration::from_secs(30))
            .map(jitter)
            .take(self.config.max_retries);

        RetryIf::spawn(
            backoff,
            || self.attempt(url),
            |e: &FetchError| {
                let retry = e.is_retryable();
                if retry {
                    warn!("GET {} failed ({}), retrying", url, e);
                }
                retry
            },
        )
        .await
    }

    async fn attempt(&self, url: &str) -> Result<Page, FetchError> {
        debug!("GET {}", url);

        let resp = self.inner.get(url).send().await.map_err(classify)?;
        let status = resp.status();
        if status == StatusCode::FORBIDDEN {
            return Err(FetchError::Blocked);
        }
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let final_url = resp.url().to_string();
        let body = resp.text().await.map_err(classify)?;
        if looks_blocked(&body) {
            return Err(FetchError::Blocked);
        }
        Ok(Page { url: final_url, body })
    }

    /// Sleep for the configured delay + random jitter.
    async fn polite_delay(&self) {
        let jitter = rand::random_range(0..=self.config.jitter_ms);
        let total = Duration::from_millis(self.config.request_delay_ms + jitter);
        sleep(total).await;
    }
}

fn classify(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(e.to_string())
    }
}
