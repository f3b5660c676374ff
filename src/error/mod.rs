//! Error taxonomy for a scrape pass.
//!
//! Per-page errors (`FetchError`, `ExtractionError`) are recoverable and end up
//! in the pass report. `ConfigurationError` signals an engineering defect and
//! aborts the pass. `ValidationError` rejects a single uploaded record.

use thiserror::Error;

// ── Fetch ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("blocked by anti-bot protection")]
    Blocked,
}

impl FetchError {
    /// Short classification used in reports, e.g. `fetch:timeout`.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout => "timeout",
            FetchError::HttpStatus(_) => "http_status",
            FetchError::Network(_) => "network",
            FetchError::Blocked => "blocked",
        }
    }

    /// Timeouts, transport errors, 429 and 5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Network(_) => true,
            FetchError::HttpStatus(code) => *code == 429 || (500..=599).contains(code),
            FetchError::Blocked => false,
        }
    }

    /// True when the failure says nothing about the page and everything about
    /// reachability of the backend.
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Timeout | FetchError::Network(_))
    }
}

// ── Extraction ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized page shape: {reason}")]
pub struct ExtractionError {
    pub reason: String,
}

impl ExtractionError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("site `{site}`: invalid selector `{selector}`: {message}")]
    InvalidSelector {
        site: String,
        selector: String,
        message: String,
    },

    #[error("unknown site `{0}`")]
    UnknownSite(String),

    #[error("no strategy registered for `{0}`")]
    UnknownStrategy(String),

    #[error("site `{site}`: invalid URL `{url}`: {message}")]
    InvalidUrl {
        site: String,
        url: String,
        message: String,
    },

    #[error("site `{0}` needs the render backend, but this build has no browser support")]
    RenderUnavailable(String),

    #[error("cannot merge a {found} draft into a {expected} entity")]
    CategoryMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid configuration value `{key}`: {message}")]
    InvalidValue { key: String, message: String },
}

// ── Validation ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

// ── Pass-level escalation ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("fetch backend unreachable: every selected site failed at its seed pages ({0})")]
    BackendExhausted(String),

    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}
