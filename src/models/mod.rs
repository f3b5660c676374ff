mod hardware;
mod records;

pub use hardware::{
    Cpu, FormFactor, Gpu, HardwareEntity, IsDefault, Motherboard, PowerConnector,
    PowerConnectorKind, UsbKind, UsbPort,
};
pub use records::{BenchmarkResult, BenchmarkUploadRow, PricePoint, PricePointUpload};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::tracker::normalize_url;

// ── Hardware category ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareCategory {
    Cpu,
    Gpu,
    Motherboard,
}

impl HardwareCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            HardwareCategory::Cpu => "cpu",
            HardwareCategory::Gpu => "gpu",
            HardwareCategory::Motherboard => "motherboard",
        }
    }
}

impl fmt::Display for HardwareCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HardwareCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" | "processor" => Ok(HardwareCategory::Cpu),
            "gpu" | "graphics card" => Ok(HardwareCategory::Gpu),
            "motherboard" | "mainboard" => Ok(HardwareCategory::Motherboard),
            other => Err(format!("unknown hardware category `{}`", other)),
        }
    }
}

// ── Model identity ────────────────────────────────────────────────────────────

/// Storage identity of a hardware entity: category + manufacturer + model name,
/// compared case-insensitively with collapsed whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelKey {
    pub category: HardwareCategory,
    pub manufacturer: String,
    pub model: String,
}

impl ModelKey {
    pub fn new(category: HardwareCategory, manufacturer: &str, model: &str) -> Option<Self> {
        let manufacturer = fold(manufacturer);
        let model = fold(model);
        if model.is_empty() {
            return None;
        }
        Some(Self {
            category,
            manufacturer,
            model,
        })
    }

    /// `manufacturer/model`, unique within a category.
    pub fn storage_key(&self) -> String {
        format!("{}/{}", self.manufacturer, self.model)
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.storage_key())
    }
}

fn fold(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ── Crawl candidates ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CandidateKind {
    /// Listing / pagination page.
    MultiPage,
    /// Product detail page.
    SinglePage,
}

/// A discovered URL awaiting processing. Identity is the normalized URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Candidate {
    pub url: String,
    pub kind: CandidateKind,
}

impl Candidate {
    /// Returns `None` for URLs that can't be crawled (non-http schemes).
    pub fn new(kind: CandidateKind, url: &Url) -> Option<Self> {
        normalize_url(url).map(|url| Self { url, kind })
    }

    pub fn multi_page(url: &Url) -> Option<Self> {
        Self::new(CandidateKind::MultiPage, url)
    }

    pub fn single_page(url: &Url) -> Option<Self> {
        Self::new(CandidateKind::SinglePage, url)
    }
}

// ── Raw spec map ──────────────────────────────────────────────────────────────

/// Label → values table lifted from a detail page, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSpecMap {
    pub title: Option<String>,
    pub part_number: Option<String>,
    entries: BTreeMap<String, Vec<String>>,
}

impl RawSpecMap {
    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Adds a row. A label seen twice (two tables on one page, any casing)
    /// keeps both value lists in page order under the first spelling.
    pub fn insert(&mut self, label: impl Into<String>, values: Vec<String>) {
        let label = label.into();
        let label = label.trim().trim_end_matches(':').trim();
        if label.is_empty() || values.is_empty() {
            return;
        }
        let existing = self
            .entries
            .keys()
            .find(|k| k.eq_ignore_ascii_case(label))
            .cloned();
        self.entries
            .entry(existing.unwrap_or_else(|| label.to_string()))
            .or_default()
            .extend(values);
    }

    /// Case-insensitive lookup.
    pub fn get(&self, label: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(label.trim()))
            .map(|(_, v)| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
