//! Crawl orchestrator: breadth-first traversal of one site.
//!
//! `Seeded → Traversing → Draining → Done`, or `Failed` when not a single
//! seed listing page could be fetched. Listing pages are popped from the
//! tracker in FIFO batches and fetched in parallel; every discovered detail
//! page is then fetched and extracted through the same bounded pool. Per-page
//! failures are recorded, never propagated.

use scraper::Html;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::PipelineConfig;
use crate::error::{ExtractionError, FetchError};
use crate::fetch::{Fetcher, Page, SiteProfile};
use crate::models::{Candidate, RawSpecMap};
use crate::strategy::SiteStrategy;
use crate::tracker::CandidateTracker;

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Seeded,
    Traversing,
    Draining,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageFailure {
    Fetch(FetchError),
    Extraction(ExtractionError),
    /// The worker handling the page panicked.
    Panicked(String),
}

impl PageFailure {
    /// `fetch:<kind>`, `extraction` or `panic`.
    pub fn cause(&self) -> String {
        match self {
            PageFailure::Fetch(e) => format!("fetch:{}", e.kind()),
            PageFailure::Extraction(_) => "extraction".to_string(),
            PageFailure::Panicked(_) => "panic".to_string(),
        }
    }
}

impl std::fmt::Display for PageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageFailure::Fetch(e) => write!(f, "{}", e),
            PageFailure::Extraction(e) => write!(f, "{}", e),
            PageFailure::Panicked(msg) => write!(f, "worker panicked: {}", msg),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageOutcome {
    pub candidate: Candidate,
    pub result: Result<RawSpecMap, PageFailure>,
}

/// Everything one site's crawl produced.
#[derive(Debug)]
pub struct SiteCrawl {
    pub site: String,
    pub state: CrawlState,
    pub listing_pages_visited: usize,
    pub listing_pages_failed: usize,
    pub outcomes: Vec<PageOutcome>,
    pub cancelled: bool,
    /// Set when the run ended in `Failed`: the first seed fetch error.
    pub seed_error: Option<FetchError>,
}

impl SiteCrawl {
    fn new(site: &str) -> Self {
        Self {
            site: site.to_string(),
            state: CrawlState::Seeded,
            listing_pages_visited: 0,
            listing_pages_failed: 0,
            outcomes: Vec::new(),
            cancelled: false,
            seed_error: None,
        }
    }

    pub fn details_extracted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn details_failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CrawlOptions {
    pub concurrency: usize,
    /// 0 = unbounded
    pub max_listing_pages: usize,
    pub retry_failed_details: bool,
}

impl From<&PipelineConfig> for CrawlOptions {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            concurrency: cfg.concurrency.max(1),
            max_listing_pages: cfg.max_listing_pages,
            retry_failed_details: cfg.retry_failed_details,
        }
    }
}

enum ListingResult {
    Visited,
    Failed(FetchError),
    Skipped,
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct CrawlOrchestrator {
    strategy: Arc<dyn SiteStrategy>,
    fetcher: Arc<dyn Fetcher>,
    profile: SiteProfile,
    options: CrawlOptions,
    cancel: CancellationToken,
}

impl CrawlOrchestrator {
    pub fn new(
        strategy: Arc<dyn SiteStrategy>,
        fetcher: Arc<dyn Fetcher>,
        profile: SiteProfile,
        options: CrawlOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            strategy,
            fetcher,
            profile,
            options,
            cancel,
        }
    }

    pub async fn run(&self, seeds: &[Url]) -> SiteCrawl {
        let mut crawl = SiteCrawl::new(&self.profile.site);
        let tracker = Arc::new(CandidateTracker::new());
        let sem = Arc::new(Semaphore::new(self.options.concurrency.max(1)));

        for seed in seeds {
            match Candidate::multi_page(seed) {
                Some(c) => {
                    tracker.offer_multi_page(c);
                }
                None => warn!("[{}] seed {} is not crawlable", crawl.site, seed),
            }
        }

        // ── Traversing ────────────────────────────────────────────────────────
        crawl.state = CrawlState::Traversing;
        let mut seed_batch = true;

        loop {
            if self.cancel.is_cancelled() {
                crawl.cancelled = true;
                break;
            }

            let attempted = crawl.listing_pages_visited + crawl.listing_pages_failed;
            let budget = match self.options.max_listing_pages {
                0 => usize::MAX,
                max => max.saturating_sub(attempted),
            };
            if budget == 0 {
                info!(
                    "[{}] listing page limit ({}) reached, {} pages left unvisited",
                    crawl.site,
                    self.options.max_listing_pages,
                    tracker.pending_multi_pages()
                );
                break;
            }

            let batch = tracker.take_multi_pages(budget);
            if batch.is_empty() {
                break;
            }

            let mut batch_visited = 0usize;
            let mut first_error = None;
            for result in self.fetch_listing_batch(batch, &tracker, &sem).await {
                match result {
                    ListingResult::Visited => batch_visited += 1,
                    ListingResult::Failed(e) => {
                        crawl.listing_pages_failed += 1;
                        first_error.get_or_insert(e);
                    }
                    ListingResult::Skipped => crawl.cancelled = true,
                }
            }
            crawl.listing_pages_visited += batch_visited;

            if seed_batch && batch_visited == 0 && first_error.is_some() {
                error!("[{}] every seed page failed, giving up on this site", crawl.site);
                crawl.state = CrawlState::Failed;
                crawl.seed_error = first_error;
                return crawl;
            }
            seed_batch = false;
        }

        debug!(
            "[{}] traversal finished: {} listing pages, {} detail pages",
            crawl.site,
            crawl.listing_pages_visited,
            tracker.single_page_count()
        );
        if crawl.cancelled {
            return crawl;
        }

        // ── Draining ──────────────────────────────────────────────────────────
        crawl.state = CrawlState::Draining;
        let (outcomes, skipped) = self.drain(tracker.single_pages(), &sem).await;
        crawl.outcomes = outcomes;
        if skipped > 0 {
            info!("[{}] cancelled with {} detail pages not fetched", crawl.site, skipped);
            crawl.cancelled = true;
            return crawl;
        }

        crawl.state = CrawlState::Done;
        crawl
    }

    async fn fetch_listing_batch(
        &self,
        batch: Vec<Candidate>,
        tracker: &Arc<CandidateTracker>,
        sem: &Arc<Semaphore>,
    ) -> Vec<ListingResult> {
        let mut handles = Vec::with_capacity(batch.len());

        for candidate in batch {
            let strategy = Arc::clone(&self.strategy);
            let fetcher = Arc::clone(&self.fetcher);
            let tracker = Arc::clone(tracker);
            let sem = Arc::clone(sem);
            let profile = self.profile.clone();
            let cancel = self.cancel.clone();

            let handle = tokio::spawn(async move {
                let Ok(_permit) = sem.acquire().await else {
                    return ListingResult::Skipped;
                };
                if cancel.is_cancelled() {
                    return ListingResult::Skipped;
                }

                match fetcher.fetch(&candidate.url, &profile).await {
                    Ok(page) => {
                        let (next, tiles) = discover(strategy.as_ref(), &candidate, &page);
                        let queued = next.into_iter().filter(|c| tracker.offer_multi_page(c.clone())).count();
                        let found = tiles.len();
                        let fresh = tiles.into_iter().filter(|c| tracker.offer_single_page(c.clone())).count();
                        debug!(
                            "[{}] {}: {} tiles ({} new), {} next page(s) queued",
                            profile.site, candidate.url, found, fresh, queued
                        );
                        ListingResult::Visited
                    }
                    Err(e) => {
                        warn!("[{}] listing page {} skipped: {}", profile.site, candidate.url, e);
                        ListingResult::Failed(e)
                    }
                }
            });
            handles.push(handle);
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!("[{}] listing task panicked: {}", self.profile.site, e);
                    ListingResult::Failed(FetchError::Network(e.to_string()))
                }
            });
        }
        results
    }

    /// Returns the recorded outcomes and how many pages were skipped because
    /// of cancellation.
    async fn drain(&self, candidates: Vec<Candidate>, sem: &Arc<Semaphore>) -> (Vec<PageOutcome>, usize) {
        let mut handles = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let owner = candidate.clone();
            let strategy = Arc::clone(&self.strategy);
            let fetcher = Arc::clone(&self.fetcher);
            let sem = Arc::clone(sem);
            let profile = self.profile.clone();
            let cancel = self.cancel.clone();
            let retry = self.options.retry_failed_details;

            let handle = tokio::spawn(async move {
                let Ok(_permit) = sem.acquire().await else {
                    return None;
                };
                if cancel.is_cancelled() {
                    return None;
                }

                let mut fetched = fetcher.fetch(&candidate.url, &profile).await;
                if retry && !cancel.is_cancelled() {
                    if let Err(e) = &fetched {
                        debug!("[{}] retrying {} after {}", profile.site, candidate.url, e);
                        fetched = fetcher.fetch(&candidate.url, &profile).await;
                    }
                }

                let result = match fetched {
                    Ok(page) => extract(strategy.as_ref(), &page).map_err(PageFailure::Extraction),
                    Err(e) => Err(PageFailure::Fetch(e)),
                };
                if let Err(failure) = &result {
                    warn!("[{}] detail page {} skipped: {}", profile.site, candidate.url, failure);
                }
                Some(PageOutcome { candidate, result })
            });
            handles.push((owner, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        let mut skipped = 0usize;
        for (candidate, handle) in handles {
            match handle.await {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) => skipped += 1,
                Err(e) => {
                    error!("[{}] detail task for {} panicked: {}", self.profile.site, candidate.url, e);
                    outcomes.push(PageOutcome {
                        candidate,
                        result: Err(PageFailure::Panicked(e.to_string())),
                    });
                }
            }
        }
        (outcomes, skipped)
    }
}

// ── Document helpers (the parsed DOM never crosses an await) ──────────────────

fn discover(strategy: &dyn SiteStrategy, candidate: &Candidate, page: &Page) -> (Vec<Candidate>, Vec<Candidate>) {
    let current = Url::parse(&page.url)
        .or_else(|_| Url::parse(&candidate.url))
        .unwrap_or_else(|_| strategy.base_url().clone());
    let doc = Html::parse_document(&page.body);
    (
        strategy.extract_multi_page_urls(&current, &doc),
        strategy.extract_single_pages_urls(&current, &doc),
    )
}

fn extract(strategy: &dyn SiteStrategy, page: &Page) -> Result<RawSpecMap, ExtractionError> {
    strategy.extract_spec_map(&Html::parse_document(&page.body))
}
