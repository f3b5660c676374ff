use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::HardwareCategory;

// ── Benchmarks ────────────────────────────────────────────────────────────────

/// Scores from one benchmark source for one model. Unique per
/// `(source, model_name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub category: HardwareCategory,
    pub source: String,
    pub model_name: String,
    /// metric → score, e.g. "multi_thread" → 38650.0
    pub scores: BTreeMap<String, f64>,
}

/// Benchmark CSV: category, source, model_name, metric, score
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BenchmarkUploadRow {
    pub category: Option<String>,
    pub source: Option<String>,
    pub model_name: Option<String>,
    pub metric: Option<String>,
    pub score: Option<f64>,
}

// ── Prices ────────────────────────────────────────────────────────────────────

/// One observed sale/listing. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub ean: String,
    pub marketplace_domain: String,
    pub marketplace_item_id: String,
    pub price: f64,
    pub currency: String,
    pub sell_date: NaiveDate,
}

/// Price CSV: ean, marketplace_domain, marketplace_item_id, sell_price, currency, sell_date
#[derive(Debug, Clone, Deserialize)]
pub struct PricePointUpload {
    pub ean: String,
    pub marketplace_domain: String,
    pub marketplace_item_id: String,
    pub sell_price: f64,
    pub currency: String,
    pub sell_date: NaiveDate,
}
