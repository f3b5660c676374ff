//! Process-wide headless browser session for JS-rendered shops.
//!
//! The session is launched on first use and shared by every worker; page
//! loads are serialized through the session lock. `release_all` closes the
//! browser once and is safe to call again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::config::RenderConfig;
use crate::error::FetchError;

#[cfg(feature = "browser")]
use chromium::Session;
#[cfg(not(feature = "browser"))]
use disabled::Session;

pub struct RenderBackend {
    config: RenderConfig,
    timeout: Duration,
    session: Mutex<Option<Session>>,
    released: AtomicBool,
}

/// Exclusive access to the live session for one page load.
pub struct SessionHandle<'a> {
    guard: MutexGuard<'a, Option<Session>>,
}

impl SessionHandle<'_> {
    fn session(&self) -> Result<&Session, FetchError> {
        self.guard
            .as_ref()
            .ok_or_else(|| FetchError::Network("render session not running".into()))
    }
}

impl RenderBackend {
    pub fn new(config: RenderConfig, timeout: Duration) -> Self {
        Self {
            config,
            timeout,
            session: Mutex::new(None),
            released: AtomicBool::new(false),
        }
    }

    /// Whether this build can render pages at all.
    pub fn is_available() -> bool {
        cfg!(feature = "browser")
    }

    pub fn is_running(&self) -> bool {
        self.session.try_lock().map(|s| s.is_some()).unwrap_or(true)
    }

    /// Launches the browser on first call; later calls reuse it.
    pub async fn acquire_session(&self) -> Result<SessionHandle<'_>, FetchError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(released());
        }
        let mut guard = self.session.lock().await;
        // release_all may have run while this call waited for the lock
        if self.released.load(Ordering::SeqCst) {
            return Err(released());
        }
        if guard.is_none() {
            info!("Launching headless browser…");
            *guard = Some(Session::launch(&self.config).await?);
        }
        Ok(SessionHandle { guard })
    }

    pub async fn render(&self, url: &str) -> Result<String, FetchError> {
        let handle = self.acquire_session().await?;
        let settle = Duration::from_millis(self.config.settle_ms);
        handle.session()?.render(url, self.timeout, settle).await
    }

    /// Awaits `work`, then releases the backend whatever `work` returned.
    pub async fn run_then_release<T>(&self, work: impl std::future::Future<Output = T>) -> T {
        let out = work.await;
        self.release_all().await;
        out
    }

    pub async fn release_all(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(session) = self.session.lock().await.take() {
            info!("Closing headless browser");
            session.close().await;
        }
    }
}

fn released() -> FetchError {
    FetchError::Network("render backend already released".into())
}

#[cfg(feature = "browser")]
mod chromium {
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::task::JoinHandle;
    use tracing::{debug, warn};

    use crate::config::RenderConfig;
    use crate::error::FetchError;

    pub struct Session {
        browser: Browser,
        handler: JoinHandle<()>,
    }

    fn network(e: impl std::fmt::Display) -> FetchError {
        FetchError::Network(e.to_string())
    }

    impl Session {
        pub async fn launch(config: &RenderConfig) -> Result<Self, FetchError> {
            let mut builder = BrowserConfig::builder()
                .arg("--no-sandbox")
                .arg("--disable-dev-shm-usage")
                .arg("--disable-gpu");
            if !config.headless {
                builder = builder.with_head();
            }
            if let Some(path) = &config.chrome_executable {
                builder = builder.chrome_executable(path);
            }
            let browser_cfg = builder.build().map_err(network)?;

            let (browser, mut handler) = Browser::launch(browser_cfg).await.map_err(network)?;
            let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

            Ok(Self { browser, handler })
        }

        pub async fn render(
            &self,
            url: &str,
            timeout: Duration,
            settle: Duration,
        ) -> Result<String, FetchError> {
            debug!("RENDER {}", url);
            let page = tokio::time::timeout(timeout, self.browser.new_page(url))
                .await
                .map_err(|_| FetchError::Timeout)?
                .map_err(network)?;

            let _ = tokio::time::timeout(timeout, page.wait_for_navigation()).await;
            tokio::time::sleep(settle).await;

            let html = tokio::time::timeout(timeout, page.content())
                .await
                .map_err(|_| FetchError::Timeout)?
                .map_err(network);

            if let Err(e) = page.close().await {
                debug!("page close failed for {}: {}", url, e);
            }
            html
        }

        pub async fn close(mut self) {
            if let Err(e) = self.browser.close().await {
                warn!("Browser close error: {}", e);
            }
            let _ = self.browser.wait().await;
            self.handler.abort();
        }
    }
}

#[cfg(not(feature = "browser"))]
mod disabled {
    use std::time::Duration;

    use crate::config::RenderConfig;
    use crate::error::FetchError;

    /// Uninhabited: without the `browser` feature no session can exist.
    pub enum Session {}

    impl Session {
        pub async fn launch(_config: &RenderConfig) -> Result<Self, FetchError> {
            Err(FetchError::Network(
                "render backend not compiled in (enable the `browser` feature)".into(),
            ))
        }

        pub async fn render(&self, _url: &str, _timeout: Duration, _settle: Duration) -> Result<String, FetchError> {
            match *self {}
        }

        pub async fn close(self) {
            match self {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_release_all_is_idempotent() {
        let backend = RenderBackend::new(RenderConfig::default(), Duration::from_secs(5));
        assert!(!backend.is_running());

        backend.release_all().await;
        backend.release_all().await;

        assert!(!backend.is_running());
        assert!(backend.acquire_session().await.is_err());
    }

    #[tokio::test]
    async fn test_failed_work_still_releases_backend() {
        let backend = RenderBackend::new(RenderConfig::default(), Duration::from_secs(5));
        let result: Result<(), FetchError> = backend
            .run_then_release(async { Err(FetchError::Network("config rejected".into())) })
            .await;

        assert!(result.is_err());
        let err = backend.acquire_session().await.err();
        assert!(matches!(err, Some(FetchError::Network(msg)) if msg.contains("already released")));
    }

    #[tokio::test]
    async fn test_no_session_after_release_while_waiting_for_lock() {
        let backend = Arc::new(RenderBackend::new(RenderConfig::default(), Duration::from_secs(5)));
        let held = backend.session.lock().await;

        let waiter = {
            let backend = Arc::clone(&backend);
            tokio::spawn(async move { backend.acquire_session().await.err() })
        };
        tokio::task::yield_now().await;

        let releaser = {
            let backend = Arc::clone(&backend);
            tokio::spawn(async move { backend.release_all().await })
        };
        tokio::task::yield_now().await;

        drop(held);
        let err = waiter.await.unwrap();
        releaser.await.unwrap();

        assert!(matches!(err, Some(FetchError::Network(msg)) if msg.contains("already released")));
        assert!(!backend.is_running());
    }

    #[cfg(not(feature = "browser"))]
    #[tokio::test]
    async fn test_render_without_browser_feature_fails_cleanly() {
        assert!(!RenderBackend::is_available());
        let backend = RenderBackend::new(RenderConfig::default(), Duration::from_secs(5));
        let err = backend.render("https://www.x-kom.pl/").await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
        assert!(!backend.is_running());
    }
}
