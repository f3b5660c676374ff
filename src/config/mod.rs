use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigurationError;
use crate::models::HardwareCategory;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default = "default_sites")]
    pub sites: Vec<SiteConfig>,
}

/// Plain-HTTP fetch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Headless browser configuration, used by `render` sites
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// 0 = unbounded
    #[serde(default = "default_max_listing_pages")]
    pub max_listing_pages: usize,

    #[serde(default = "default_max_reported_failures")]
    pub max_reported_failures: usize,

    /// Give a detail page whose fetch failed one more attempt in the same run.
    #[serde(default)]
    pub retry_failed_details: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    #[default]
    Http,
    Render,
}

/// One crawlable site: which strategy parses it, where the crawl starts,
/// and which hardware category its detail pages describe.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    pub name: String,
    pub strategy: String,
    pub category: HardwareCategory,
    pub base_url: String,
    pub seed_urls: Vec<String>,

    #[serde(default)]
    pub fetch_mode: FetchMode,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_timeout_secs() -> u64 {
    30
}
fn default_request_delay_ms() -> u64 {
    1000
}
fn default_jitter_ms() -> u64 {
    500
}
fn default_max_retries() -> usize {
    3
}
fn default_retry_backoff_ms() -> u64 {
    250
}
fn default_user_agent() -> String {
    "hwspec-scraper/0.1 (hardware catalogue research; polite crawler)".to_string()
}
fn default_settle_ms() -> u64 {
    1500
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/hardware.duckdb")
}
fn default_true() -> bool {
    true
}
fn default_concurrency() -> usize {
    4
}
fn default_max_listing_pages() -> usize {
    50
}
fn default_max_reported_failures() -> usize {
    50
}

fn site(
    name: &str,
    strategy: &str,
    category: HardwareCategory,
    base_url: &str,
    seed: &str,
    fetch_mode: FetchMode,
) -> SiteConfig {
    SiteConfig {
        name: name.to_string(),
        strategy: strategy.to_string(),
        category,
        base_url: base_url.to_string(),
        seed_urls: vec![seed.to_string()],
        fetch_mode,
        enabled: fetch_mode == FetchMode::Http,
    }
}

fn default_sites() -> Vec<SiteConfig> {
    use FetchMode::{Http, Render};
    use HardwareCategory::{Cpu, Gpu, Motherboard};
    vec![
        site("newegg-cpu", "newegg", Cpu, "https://www.newegg.com",
             "https://www.newegg.com/p/pl?N=100007671", Http),
        site("newegg-gpu", "newegg", Gpu, "https://www.newegg.com",
             "https://www.newegg.com/p/pl?N=100007709", Http),
        site("xkom-motherboard", "xkom", Motherboard, "https://www.x-kom.pl",
             "https://www.x-kom.pl/g-5/c/14-plyty-glowne.html", Render),
        site("morele-gpu", "morele", Gpu, "https://www.morele.net",
             "https://www.morele.net/kategoria/karty-graficzne-12/", Http),
    ]
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            jitter_ms: default_jitter_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            chrome_executable: None,
            headless: true,
            settle_ms: default_settle_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            run_migrations: true,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_listing_pages: default_max_listing_pages(),
            max_reported_failures: default_max_reported_failures(),
            retry_failed_details: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scraper: ScraperConfig::default(),
            render: RenderConfig::default(),
            storage: StorageConfig::default(),
            pipeline: PipelineConfig::default(),
            sites: default_sites(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("HWSCRAPE").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize()?;
        app_cfg.validate()?;
        Ok(app_cfg)
    }

    /// Rejects values that would make a pass meaningless before any fetch.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.pipeline.concurrency == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "pipeline.concurrency".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.scraper.timeout_secs == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "scraper.timeout_secs".into(),
                message: "must be at least 1".into(),
            });
        }
        let mut names = std::collections::HashSet::new();
        for site in &self.sites {
            if !names.insert(site.name.as_str()) {
                return Err(ConfigurationError::InvalidValue {
                    key: "sites".into(),
                    message: format!("duplicate site name `{}`", site.name),
                });
            }
            if site.seed_urls.is_empty() {
                return Err(ConfigurationError::InvalidValue {
                    key: format!("sites.{}.seed_urls", site.name),
                    message: "at least one seed URL is required".into(),
                });
            }
        }
        Ok(())
    }

    pub fn site(&self, name: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.pipeline.max_listing_pages, 50);
        assert!(!cfg.pipeline.retry_failed_details);
        assert_eq!(cfg.site("xkom-motherboard").unwrap().fetch_mode, FetchMode::Render);
    }

    #[test]
    fn test_sites_deserialize_from_toml() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [pipeline]
                concurrency = 2

                [[sites]]
                name = "morele-cpu"
                strategy = "morele"
                category = "cpu"
                base_url = "https://www.morele.net"
                seed_urls = ["https://www.morele.net/kategoria/procesory-45/"]
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.pipeline.concurrency, 2);
        assert_eq!(cfg.pipeline.max_reported_failures, 50);
        assert_eq!(cfg.scraper.timeout_secs, 30);
        assert_eq!(cfg.sites.len(), 1);
        let site = &cfg.sites[0];
        assert_eq!(site.category, HardwareCategory::Cpu);
        assert_eq!(site.fetch_mode, FetchMode::Http);
        assert!(site.enabled);
    }

    #[test]
    fn test_duplicate_site_names_rejected() {
        let mut cfg = AppConfig::default();
        let dup = cfg.sites[0].clone();
        cfg.sites.push(dup);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigurationError::InvalidValue { key, .. }) if key == "sites"
        ));
    }
}
