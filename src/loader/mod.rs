//! Upload surface: CSV import of price points and benchmark results.
//!
//! Every row is validated on its own; a bad row is reported with its line
//! number and never blocks the rest of the file.

use crate::error::ValidationError;
use crate::models::{BenchmarkResult, BenchmarkUploadRow, HardwareCategory, PricePoint, PricePointUpload};
use crate::storage::HardwareStore;
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    /// 1-based line in the file, header included.
    pub line: usize,
    pub error: ValidationError,
}

#[derive(Debug, Default)]
pub struct UploadReport {
    pub accepted: usize,
    pub rejected: Vec<RejectedRow>,
}

impl UploadReport {
    fn reject(&mut self, line: usize, error: ValidationError) {
        warn!("line {}: rejected: {}", line, error);
        self.rejected.push(RejectedRow { line, error });
    }
}

// ── Price points ──────────────────────────────────────────────────────────────

/// Price CSV row before any typing, so a malformed number is a per-row
/// validation failure rather than a reader error.
#[derive(Debug, Default, Deserialize)]
struct PriceCsvRow {
    ean: Option<String>,
    marketplace_domain: Option<String>,
    marketplace_item_id: Option<String>,
    sell_price: Option<String>,
    currency: Option<String>,
    sell_date: Option<String>,
}

fn required<'a>(field: &'static str, value: &'a Option<String>) -> Result<&'a str, ValidationError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ValidationError::new(field, "is required"))
}

impl PriceCsvRow {
    fn into_upload(self) -> Result<PricePointUpload, ValidationError> {
        let sell_price = required("sell_price", &self.sell_price)?
            .parse::<f64>()
            .map_err(|_| ValidationError::new("sell_price", "is not a number"))?;
        let sell_date = NaiveDate::parse_from_str(required("sell_date", &self.sell_date)?, "%Y-%m-%d")
            .map_err(|_| ValidationError::new("sell_date", "expected YYYY-MM-DD"))?;

        Ok(PricePointUpload {
            ean: required("ean", &self.ean)?.to_string(),
            marketplace_domain: required("marketplace_domain", &self.marketplace_domain)?.to_string(),
            marketplace_item_id: required("marketplace_item_id", &self.marketplace_item_id)?.to_string(),
            sell_price,
            currency: required("currency", &self.currency)?.to_string(),
            sell_date,
        })
    }
}

/// Checks one submitted price point against `today` and returns the record
/// to store.
pub fn validate_price_upload(upload: &PricePointUpload, today: NaiveDate) -> Result<PricePoint, ValidationError> {
    let ean = upload.ean.trim();
    if !(ean.len() == 8 || ean.len() == 13) || !ean.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::new("ean", "must be 8 or 13 digits"));
    }

    let domain = upload.marketplace_domain.trim().to_lowercase();
    if domain.is_empty() {
        return Err(ValidationError::new("marketplace_domain", "must not be blank"));
    }
    let item_id = upload.marketplace_item_id.trim();
    if item_id.is_empty() {
        return Err(ValidationError::new("marketplace_item_id", "must not be blank"));
    }

    if !upload.sell_price.is_finite() || upload.sell_price <= 0.0 {
        return Err(ValidationError::new("sell_price", "must be greater than 0"));
    }

    let currency = upload.currency.trim();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::new("currency", "must be a 3-letter code"));
    }

    if upload.sell_date > today {
        return Err(ValidationError::new("sell_date", "must not be in the future"));
    }

    Ok(PricePoint {
        ean: ean.to_string(),
        marketplace_domain: domain,
        marketplace_item_id: item_id.to_string(),
        price: upload.sell_price,
        currency: currency.to_ascii_uppercase(),
        sell_date: upload.sell_date,
    })
}

/// Validates and appends one price point. `Ok(Err(_))` is a rejected record;
/// the outer error is a storage failure.
pub fn submit_price_point(
    store: &dyn HardwareStore,
    upload: &PricePointUpload,
    today: NaiveDate,
) -> Result<Result<i64, ValidationError>> {
    match validate_price_upload(upload, today) {
        Ok(point) => Ok(Ok(store.insert_price_point(&point)?)),
        Err(e) => Ok(Err(e)),
    }
}

pub fn load_prices(path: &Path, store: &dyn HardwareStore) -> Result<UploadReport> {
    let file = std::fs::File::open(path).with_context(|| format!("Could not open {:?}", path))?;
    let report = load_prices_from_reader(file, store, Local::now().date_naive())?;
    info!(
        "{:?}: {} price points stored, {} rows rejected",
        path,
        report.accepted,
        report.rejected.len()
    );
    Ok(report)
}

pub fn load_prices_from_reader<R: Read>(reader: R, store: &dyn HardwareStore, today: NaiveDate) -> Result<UploadReport> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut report = UploadReport::default();
    for (i, result) in reader.deserialize::<PriceCsvRow>().enumerate() {
        let line = i + 2;
        let upload = match result {
            Ok(row) => row.into_upload(),
            Err(e) => Err(ValidationError::new("row", e.to_string())),
        };
        let upload = match upload {
            Ok(u) => u,
            Err(e) => {
                report.reject(line, e);
                continue;
            }
        };

        match submit_price_point(store, &upload, today)? {
            Ok(id) => {
                debug!("line {}: stored price point #{}", line, id);
                report.accepted += 1;
            }
            Err(e) => report.reject(line, e),
        }
    }
    Ok(report)
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

struct BenchmarkScore {
    category: HardwareCategory,
    source: String,
    model_name: String,
    metric: String,
    score: f64,
}

fn validate_benchmark_row(row: BenchmarkUploadRow) -> Result<BenchmarkScore, ValidationError> {
    let category = required("category", &row.category)?
        .parse::<HardwareCategory>()
        .map_err(|e| ValidationError::new("category", e))?;
    let score = row
        .score
        .ok_or_else(|| ValidationError::new("score", "is required"))?;
    if !score.is_finite() || score < 0.0 {
        return Err(ValidationError::new("score", "must be a non-negative number"));
    }

    Ok(BenchmarkScore {
        category,
        source: required("source", &row.source)?.to_string(),
        model_name: required("model_name", &row.model_name)?.to_string(),
        metric: required("metric", &row.metric)?.to_lowercase(),
        score,
    })
}

pub fn load_benchmarks(path: &Path, store: &dyn HardwareStore) -> Result<UploadReport> {
    let file = std::fs::File::open(path).with_context(|| format!("Could not open {:?}", path))?;
    let report = load_benchmarks_from_reader(file, store)?;
    info!(
        "{:?}: {} benchmark rows stored, {} rows rejected",
        path,
        report.accepted,
        report.rejected.len()
    );
    Ok(report)
}

/// Rows are grouped by `(source, model_name)`; each group becomes one
/// `BenchmarkResult` with a score per metric.
pub fn load_benchmarks_from_reader<R: Read>(reader: R, store: &dyn HardwareStore) -> Result<UploadReport> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut report = UploadReport::default();
    let mut groups: BTreeMap<(String, String), BenchmarkResult> = BTreeMap::new();

    for (i, result) in reader.deserialize::<BenchmarkUploadRow>().enumerate() {
        let line = i + 2;
        let row = match result
            .map_err(|e| ValidationError::new("row", e.to_string()))
            .and_then(validate_benchmark_row)
        {
            Ok(row) => row,
            Err(e) => {
                report.reject(line, e);
                continue;
            }
        };

        let key = (row.source.clone(), row.model_name.clone());
        let group = groups.entry(key).or_insert_with(|| BenchmarkResult {
            category: row.category,
            source: row.source,
            model_name: row.model_name,
            scores: BTreeMap::new(),
        });
        if group.category != row.category {
            report.reject(
                line,
                ValidationError::new("category", format!("conflicts with earlier `{}` rows", group.category)),
            );
            continue;
        }
        group.scores.insert(row.metric, row.score);
        report.accepted += 1;
    }

    for result in groups.values() {
        store.upsert_benchmark(result)?;
    }
    debug!("{} benchmark results upserted", groups.len());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Repository;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn upload(price: f64) -> PricePointUpload {
        PricePointUpload {
            ean: "4719331318245".into(),
            marketplace_domain: "Allegro.pl".into(),
            marketplace_item_id: "14999812345".into(),
            sell_price: price,
            currency: "pln".into(),
            sell_date: NaiveDate::from_ymd_opt(2024, 5, 30).unwrap(),
        }
    }

    fn repo() -> Repository {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        repo
    }

    #[test]
    fn test_zero_price_rejected_positive_price_stored() {
        let repo = repo();

        let rejected = submit_price_point(&repo, &upload(0.0), today()).unwrap();
        assert_eq!(rejected.unwrap_err().field, "sell_price");
        assert_eq!(repo.counts().unwrap().price_points, 0);

        let stored = submit_price_point(&repo, &upload(199.99), today()).unwrap();
        assert!(stored.is_ok());

        let points = repo.price_points_for_ean("4719331318245").unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].price, 199.99);
        assert_eq!(points[0].currency, "PLN");
        assert_eq!(points[0].marketplace_domain, "allegro.pl");
    }

    #[test]
    fn test_price_validation_rules() {
        let mut u = upload(10.0);
        u.ean = "12345".into();
        assert_eq!(validate_price_upload(&u, today()).unwrap_err().field, "ean");

        let mut u = upload(10.0);
        u.sell_date = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        assert_eq!(validate_price_upload(&u, today()).unwrap_err().field, "sell_date");

        let mut u = upload(10.0);
        u.currency = "zł".into();
        assert_eq!(validate_price_upload(&u, today()).unwrap_err().field, "currency");

        let u = upload(f64::NAN);
        assert_eq!(validate_price_upload(&u, today()).unwrap_err().field, "sell_price");

        let mut u = upload(10.0);
        u.sell_date = today();
        assert!(validate_price_upload(&u, today()).is_ok());
    }

    #[test]
    fn test_price_csv_reports_bad_rows_by_line() {
        let csv = "\
ean,marketplace_domain,marketplace_item_id,sell_price,currency,sell_date
4719331318245,allegro.pl,1,199.99,PLN,2024-05-01
4719331318245,allegro.pl,2,0,PLN,2024-05-02
4719331318245,allegro.pl,3,abc,PLN,2024-05-03
4719331318245,ceneo.pl,4,1749.00,PLN,2024-05-04
";
        let repo = repo();
        let report = load_prices_from_reader(csv.as_bytes(), &repo, today()).unwrap();

        assert_eq!(report.accepted, 2);
        let lines: Vec<usize> = report.rejected.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![3, 4]);
        assert_eq!(repo.counts().unwrap().price_points, 2);
    }

    #[test]
    fn test_benchmarks_grouped_per_source_and_model() {
        let csv = "\
category,source,model_name,metric,score
cpu,cinebench-r23,AMD Ryzen 7 7800X3D,single_thread,1780
cpu,cinebench-r23,AMD Ryzen 7 7800X3D,multi_thread,18200
cpu,cinebench-r23,Intel Core i5-14600K,multi_thread,24500
gpu,3dmark-timespy,RTX 4070,graphics,-5
toaster,3dmark-timespy,RTX 4070,graphics,17800
";
        let repo = repo();
        let report = load_benchmarks_from_reader(csv.as_bytes(), &repo).unwrap();

        assert_eq!(report.accepted, 3);
        assert_eq!(report.rejected.len(), 2);
        assert_eq!(repo.counts().unwrap().benchmarks, 2);

        let x3d = repo
            .find_benchmark("cinebench-r23", "AMD Ryzen 7 7800X3D")
            .unwrap()
            .unwrap();
        assert_eq!(x3d.scores.len(), 2);
        assert_eq!(x3d.scores["multi_thread"], 18200.0);
    }
}
