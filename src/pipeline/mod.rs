//! Scrape service: crawl → normalize → merge → upsert, one pass at a time.
//!
//! ## One pass
//!
//!   1. Resolve the site selection and build every site's strategy. Any
//!      configuration problem aborts here, before a single fetch.
//!   2. Crawl all selected sites concurrently (one task per site).
//!   3. For every extracted detail page: normalize into a draft, take the
//!      model key's lock, then create the entity or fill its blank fields.
//!   4. Log the pass in `scrape_runs` and return the per-site report.
//!
//! Re-running a pass is safe: already established fields are never
//! overwritten, so a repeat pass only fills what earlier passes missed.

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

use crate::config::{AppConfig, FetchMode, SiteConfig};
use crate::crawl::{CrawlOptions, CrawlOrchestrator, CrawlState, SiteCrawl};
use crate::error::{ConfigurationError, ScrapeError};
use crate::fetch::{Fetcher, RenderBackend, SiteProfile};
use crate::merge::{merge, KeyedLocks};
use crate::models::{HardwareCategory, HardwareEntity, RawSpecMap};
use crate::normalize::normalize;
use crate::storage::HardwareStore;
use crate::strategy::{SiteStrategy, StrategyRegistry};
use crate::utils::Timer;

// ── Report ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteState {
    Done,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub url: String,
    /// `fetch:<kind>`, `extraction` or `normalization`
    pub cause: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteReport {
    pub site: String,
    pub state: SiteState,
    pub listing_pages_visited: usize,
    pub listing_pages_failed: usize,
    pub details_extracted: usize,
    pub details_failed: usize,
    pub entities_created: usize,
    pub entities_updated: usize,
    pub entities_unchanged: usize,
    pub failures: Vec<FailureRecord>,
}

impl SiteReport {
    fn new(site: &str) -> Self {
        Self {
            site: site.to_string(),
            state: SiteState::Done,
            listing_pages_visited: 0,
            listing_pages_failed: 0,
            details_extracted: 0,
            details_failed: 0,
            entities_created: 0,
            entities_updated: 0,
            entities_unchanged: 0,
            failures: Vec::new(),
        }
    }

    fn record_failure(&mut self, url: &str, cause: String, limit: usize) {
        self.details_failed += 1;
        if self.failures.len() < limit {
            self.failures.push(FailureRecord { url: url.to_string(), cause });
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub run_id: i64,
    pub sites: Vec<SiteReport>,
}

impl PassReport {
    pub fn entities_created(&self) -> usize {
        self.sites.iter().map(|s| s.entities_created).sum()
    }

    pub fn entities_updated(&self) -> usize {
        self.sites.iter().map(|s| s.entities_updated).sum()
    }

    pub fn details_failed(&self) -> usize {
        self.sites.iter().map(|s| s.details_failed).sum()
    }

    pub fn site(&self, name: &str) -> Option<&SiteReport> {
        self.sites.iter().find(|s| s.site == name)
    }
}

// ── Service ───────────────────────────────────────────────────────────────────

/// Everything a site task needs, resolved before the pass starts.
struct PreparedSite {
    name: String,
    category: HardwareCategory,
    profile: SiteProfile,
    strategy: Arc<dyn SiteStrategy>,
    seeds: Vec<Url>,
}

pub struct ScrapeService {
    config: AppConfig,
    registry: StrategyRegistry,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn HardwareStore>,
    locks: Arc<KeyedLocks>,
    cancel: CancellationToken,
}

impl ScrapeService {
    pub fn new(config: AppConfig, fetcher: Arc<dyn Fetcher>, store: Arc<dyn HardwareStore>) -> Self {
        Self {
            config,
            registry: StrategyRegistry::with_builtin(),
            fetcher,
            store,
            locks: Arc::new(KeyedLocks::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_registry(mut self, registry: StrategyRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Shares an existing shutdown token instead of the service's own.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Cancelling this token stops new fetches; the running pass returns
    /// what it has.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs one pass over `selection` (site names), or over every enabled
    /// site when the selection is empty.
    pub async fn run_scrape_pass(&self, selection: &[String]) -> Result<PassReport, ScrapeError> {
        let sites = self.prepare(selection)?;
        let _timer = Timer::start(format!("scrape pass ({} sites)", sites.len()));
        let run_id = self.store.begin_scrape_run(sites.len())?;

        let options = CrawlOptions::from(&self.config.pipeline);
        let max_failures = self.config.pipeline.max_reported_failures;
        let mut handles = Vec::with_capacity(sites.len());

        for site in sites {
            let fetcher = Arc::clone(&self.fetcher);
            let store = Arc::clone(&self.store);
            let locks = Arc::clone(&self.locks);
            let cancel = self.cancel.clone();
            let name = site.name.clone();

            let handle = tokio::spawn(async move {
                let orchestrator = CrawlOrchestrator::new(
                    Arc::clone(&site.strategy),
                    fetcher,
                    site.profile.clone(),
                    options,
                    cancel,
                );
                let crawl = orchestrator.run(&site.seeds).await;
                let report = ingest(site.category, &crawl, store.as_ref(), &locks, max_failures).await?;
                Ok::<_, ScrapeError>((crawl, report))
            });
            handles.push((name, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        let mut seed_failures = Vec::new();
        let mut abort: Option<ScrapeError> = None;

        for (name, handle) in handles {
            match handle.await {
                Ok(Ok((crawl, report))) => {
                    if crawl.state == CrawlState::Failed {
                        seed_failures.push((name, crawl.seed_error));
                    }
                    reports.push(report);
                }
                Ok(Err(e)) => {
                    error!("[{}] pass aborted: {}", name, e);
                    abort.get_or_insert(e);
                }
                Err(e) => {
                    error!("[{}] site task panicked: {}", name, e);
                    let mut report = SiteReport::new(&name);
                    report.state = SiteState::Failed;
                    reports.push(report);
                }
            }
        }

        if abort.is_none() && !reports.is_empty() && seed_failures.len() == reports.len() {
            let all_transport = seed_failures
                .iter()
                .all(|(_, e)| e.as_ref().is_some_and(|e| e.is_transport()));
            if all_transport {
                let detail = seed_failures
                    .iter()
                    .map(|(site, e)| match e {
                        Some(e) => format!("{}: {}", site, e),
                        None => site.clone(),
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                abort = Some(ScrapeError::BackendExhausted(detail));
            }
        }

        let created: usize = reports.iter().map(|r| r.entities_created).sum();
        let updated: usize = reports.iter().map(|r| r.entities_updated).sum();

        if let Some(e) = abort {
            if let Err(log_err) = self.store.finish_scrape_run(run_id, created, updated, Some(&e.to_string())) {
                warn!("could not close scrape run {}: {:#}", run_id, log_err);
            }
            return Err(e);
        }

        let failed_details: usize = reports.iter().map(|r| r.details_failed).sum();
        let note = (failed_details > 0).then(|| format!("{} detail pages failed", failed_details));
        self.store.finish_scrape_run(run_id, created, updated, note.as_deref())?;

        let report = PassReport { run_id, sites: reports };
        info!(
            "=== Pass {} done: {} created | {} updated | {} failed detail pages ===",
            run_id,
            report.entities_created(),
            report.entities_updated(),
            report.details_failed(),
        );
        Ok(report)
    }

    fn prepare(&self, selection: &[String]) -> Result<Vec<PreparedSite>, ConfigurationError> {
        let selected: Vec<&SiteConfig> = if selection.is_empty() {
            self.config.sites.iter().filter(|s| s.enabled).collect()
        } else {
            selection
                .iter()
                .map(|name| {
                    self.config
                        .site(name)
                        .ok_or_else(|| ConfigurationError::UnknownSite(name.clone()))
                })
                .collect::<Result<_, _>>()?
        };

        selected.into_iter().map(|site| self.prepare_site(site)).collect()
    }

    fn prepare_site(&self, site: &SiteConfig) -> Result<PreparedSite, ConfigurationError> {
        if site.fetch_mode == FetchMode::Render && !RenderBackend::is_available() {
            return Err(ConfigurationError::RenderUnavailable(site.name.clone()));
        }

        let parse = |url: &str| {
            Url::parse(url).map_err(|e| ConfigurationError::InvalidUrl {
                site: site.name.clone(),
                url: url.to_string(),
                message: e.to_string(),
            })
        };
        let base_url = parse(&site.base_url)?;
        let seeds = site.seed_urls.iter().map(|u| parse(u)).collect::<Result<Vec<_>, _>>()?;
        let strategy = self.registry.build(&site.strategy, &site.name, &base_url)?;

        Ok(PreparedSite {
            name: site.name.clone(),
            category: site.category,
            profile: SiteProfile::from(site),
            strategy,
            seeds,
        })
    }
}

// ── Ingestion ─────────────────────────────────────────────────────────────────

enum Applied {
    Created,
    Updated,
    Unchanged,
}

async fn ingest(
    category: HardwareCategory,
    crawl: &SiteCrawl,
    store: &dyn HardwareStore,
    locks: &KeyedLocks,
    max_failures: usize,
) -> Result<SiteReport, ScrapeError> {
    let mut report = SiteReport::new(&crawl.site);
    report.listing_pages_visited = crawl.listing_pages_visited;
    report.listing_pages_failed = crawl.listing_pages_failed;
    report.state = match (crawl.state, crawl.cancelled) {
        (_, true) => SiteState::Cancelled,
        (CrawlState::Failed, _) => SiteState::Failed,
        _ => SiteState::Done,
    };

    for outcome in &crawl.outcomes {
        let raw = match &outcome.result {
            Ok(raw) => raw,
            Err(failure) => {
                report.record_failure(&outcome.candidate.url, failure.cause(), max_failures);
                continue;
            }
        };

        match apply(category, raw, store, locks).await? {
            Some(applied) => {
                report.details_extracted += 1;
                match applied {
                    Applied::Created => report.entities_created += 1,
                    Applied::Updated => report.entities_updated += 1,
                    Applied::Unchanged => report.entities_unchanged += 1,
                }
            }
            None => {
                warn!("[{}] {}: no model identity on page", crawl.site, outcome.candidate.url);
                report.record_failure(&outcome.candidate.url, "normalization".to_string(), max_failures);
            }
        }
    }

    info!(
        "[{}] {:?}: {} listing pages | {} extracted | {} failed | {} created | {} updated | {} unchanged",
        report.site,
        report.state,
        report.listing_pages_visited,
        report.details_extracted,
        report.details_failed,
        report.entities_created,
        report.entities_updated,
        report.entities_unchanged,
    );
    Ok(report)
}

/// `None` when the spec map can't be normalized into a keyed draft.
async fn apply(
    category: HardwareCategory,
    raw: &RawSpecMap,
    store: &dyn HardwareStore,
    locks: &KeyedLocks,
) -> Result<Option<Applied>, ScrapeError> {
    let Ok(draft) = normalize(category, raw) else {
        return Ok(None);
    };
    let Some(key) = draft.model_key() else {
        return Ok(None);
    };

    let _guard = locks.lock(&key).await;
    let applied = match store.find_by_model_key(&key)? {
        Some(mut existing) => {
            if merge(&mut existing, draft)?.changed() {
                store.upsert(&existing)?;
                Applied::Updated
            } else {
                Applied::Unchanged
            }
        }
        None => {
            let mut entity = HardwareEntity::empty(category);
            merge(&mut entity, draft)?;
            store.upsert(&entity)?;
            Applied::Created
        }
    };
    Ok(Some(applied))
}
