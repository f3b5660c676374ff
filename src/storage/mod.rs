use crate::models::{BenchmarkResult, HardwareCategory, HardwareEntity, ModelKey, PricePoint};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use duckdb::{params, Connection, OptionalExt};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

// ── Storage contract ──────────────────────────────────────────────────────────

/// What the scrape pipeline and the upload surface need from persistence.
pub trait HardwareStore: Send + Sync {
    fn find_by_model_key(&self, key: &ModelKey) -> Result<Option<HardwareEntity>>;

    /// Create or replace the document stored under the entity's model key.
    fn upsert(&self, entity: &HardwareEntity) -> Result<()>;

    /// Unique per `(source, model_name)`; a re-upload replaces the scores.
    fn upsert_benchmark(&self, result: &BenchmarkResult) -> Result<()>;

    /// Append-only.
    fn insert_price_point(&self, point: &PricePoint) -> Result<i64>;

    /// Opens a `scrape_runs` row and returns its id.
    fn begin_scrape_run(&self, sites: usize) -> Result<i64>;

    fn finish_scrape_run(&self, run_id: i64, created: usize, updated: usize, error: Option<&str>) -> Result<()>;
}

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS hardware_entities (
    category    VARCHAR   NOT NULL,
    model_key   VARCHAR   NOT NULL,
    model_name  VARCHAR   NOT NULL,
    document    VARCHAR   NOT NULL,
    first_seen  TIMESTAMP NOT NULL,
    updated_at  TIMESTAMP NOT NULL,
    PRIMARY KEY (category, model_key)
);

CREATE TABLE IF NOT EXISTS benchmark_results (
    source      VARCHAR   NOT NULL,
    model_name  VARCHAR   NOT NULL,
    category    VARCHAR   NOT NULL,
    scores      VARCHAR   NOT NULL,
    updated_at  TIMESTAMP NOT NULL,
    PRIMARY KEY (source, model_name)
);

CREATE SEQUENCE IF NOT EXISTS price_point_ids START 1;

CREATE TABLE IF NOT EXISTS price_points (
    id                   BIGINT    PRIMARY KEY DEFAULT nextval('price_point_ids'),
    ean                  VARCHAR   NOT NULL,
    marketplace_domain   VARCHAR   NOT NULL,
    marketplace_item_id  VARCHAR   NOT NULL,
    price                DOUBLE    NOT NULL,
    currency             VARCHAR   NOT NULL,
    sell_date            DATE      NOT NULL,
    recorded_at          TIMESTAMP NOT NULL
);

CREATE SEQUENCE IF NOT EXISTS scrape_run_ids START 1;

CREATE TABLE IF NOT EXISTS scrape_runs (
    id                  BIGINT    PRIMARY KEY DEFAULT nextval('scrape_run_ids'),
    started_at          TIMESTAMP NOT NULL,
    finished_at         TIMESTAMP,
    status              VARCHAR   NOT NULL DEFAULT 'running',
    sites               INTEGER   DEFAULT 0,
    entities_created    INTEGER   DEFAULT 0,
    entities_updated    INTEGER   DEFAULT 0,
    error_msg           VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_prices_ean    ON price_points (ean);
CREATE INDEX IF NOT EXISTS idx_prices_date   ON price_points (sell_date);
"#;

// ── Repository ────────────────────────────────────────────────────────────────

/// DuckDB-backed store. The connection is not shareable across threads, so
/// every call goes through one mutex.
pub struct Repository {
    conn: Mutex<Connection>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub entities: i64,
    pub benchmarks: i64,
    pub price_points: i64,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        let conn = self.conn();
        conn.execute_batch(DDL).context("DDL failed")?;
        conn.execute_batch(INDEXES).context("Index creation failed")?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Stats ─────────────────────────────────────────────────────────────────

    pub fn counts(&self) -> Result<StoreCounts> {
        let conn = self.conn();
        let count = |table: &str| -> Result<i64> {
            let sql = format!("SELECT COUNT(*) FROM {}", table);
            Ok(conn.query_row(&sql, [], |r| r.get(0))?)
        };
        Ok(StoreCounts {
            entities: count("hardware_entities")?,
            benchmarks: count("benchmark_results")?,
            price_points: count("price_points")?,
        })
    }

    pub fn entity_counts_by_category(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT category, COUNT(*) FROM hardware_entities GROUP BY category ORDER BY category",
        )?;
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<(String, i64)>, _>>()?;
        Ok(rows)
    }

    pub fn price_date_range(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
        let conn = self.conn();
        let mut s = conn.prepare("SELECT MIN(sell_date), MAX(sell_date) FROM price_points")?;
        Ok(s.query_row([], |r| Ok((r.get(0)?, r.get(1)?)))?)
    }

    pub fn price_points_for_ean(&self, ean: &str) -> Result<Vec<PricePoint>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"SELECT ean, marketplace_domain, marketplace_item_id, price, currency, sell_date
               FROM price_points WHERE ean = ? ORDER BY sell_date, id"#,
        )?;
        let rows = stmt
            .query_map(params![ean], |r| {
                Ok(PricePoint {
                    ean: r.get(0)?,
                    marketplace_domain: r.get(1)?,
                    marketplace_item_id: r.get(2)?,
                    price: r.get(3)?,
                    currency: r.get(4)?,
                    sell_date: r.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn find_benchmark(&self, source: &str, model_name: &str) -> Result<Option<BenchmarkResult>> {
        let conn = self.conn();
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT category, scores FROM benchmark_results WHERE source = ? AND model_name = ?",
                params![source, model_name],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        let Some((category, scores)) = row else {
            return Ok(None);
        };
        let category: HardwareCategory = category.parse().map_err(anyhow::Error::msg)?;
        Ok(Some(BenchmarkResult {
            category,
            source: source.to_string(),
            model_name: model_name.to_string(),
            scores: serde_json::from_str(&scores).context("corrupt benchmark scores")?,
        }))
    }
}

impl HardwareStore for Repository {
    fn find_by_model_key(&self, key: &ModelKey) -> Result<Option<HardwareEntity>> {
        let conn = self.conn();
        let document: Option<String> = conn
            .query_row(
                "SELECT document FROM hardware_entities WHERE category = ? AND model_key = ?",
                params![key.category.as_str(), key.storage_key()],
                |r| r.get(0),
            )
            .optional()
            .with_context(|| format!("lookup {}", key))?;

        document
            .map(|doc| serde_json::from_str(&doc).with_context(|| format!("corrupt document for {}", key)))
            .transpose()
    }

    fn upsert(&self, entity: &HardwareEntity) -> Result<()> {
        let key = entity
            .model_key()
            .context("entity has no model name to key it by")?;
        let document = serde_json::to_string(entity)?;
        let now = Utc::now().naive_utc();

        self.conn()
            .execute(
                r#"INSERT INTO hardware_entities
                       (category, model_key, model_name, document, first_seen, updated_at)
                   VALUES (?, ?, ?, ?, ?, ?)
                   ON CONFLICT (category, model_key) DO UPDATE SET
                       model_name = excluded.model_name,
                       document   = excluded.document,
                       updated_at = excluded.updated_at"#,
                params![
                    key.category.as_str(),
                    key.storage_key(),
                    entity.model_name(),
                    document,
                    now,
                    now,
                ],
            )
            .with_context(|| format!("upsert {}", key))?;
        Ok(())
    }

    fn upsert_benchmark(&self, result: &BenchmarkResult) -> Result<()> {
        let scores = serde_json::to_string(&result.scores)?;
        self.conn()
            .execute(
                r#"INSERT INTO benchmark_results (source, model_name, category, scores, updated_at)
                   VALUES (?, ?, ?, ?, ?)
                   ON CONFLICT (source, model_name) DO UPDATE SET
                       category   = excluded.category,
                       scores     = excluded.scores,
                       updated_at = excluded.updated_at"#,
                params![
                    result.source,
                    result.model_name,
                    result.category.as_str(),
                    scores,
                    Utc::now().naive_utc(),
                ],
            )
            .with_context(|| format!("upsert benchmark {}/{}", result.source, result.model_name))?;
        Ok(())
    }

    fn begin_scrape_run(&self, sites: usize) -> Result<i64> {
        let conn = self.conn();
        let id: i64 = conn.query_row(
            "INSERT INTO scrape_runs (started_at, status, sites) VALUES (?, 'running', ?) RETURNING id",
            params![Utc::now().naive_utc(), sites as i64],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    fn finish_scrape_run(
        &self,
        run_id: i64,
        created: usize,
        updated: usize,
        error: Option<&str>,
    ) -> Result<()> {
        self.conn().execute(
            r#"UPDATE scrape_runs SET
               finished_at = ?, status = ?,
               entities_created = ?, entities_updated = ?, error_msg = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if error.is_none() { "success" } else { "error" },
                created as i64,
                updated as i64,
                error,
                run_id,
            ],
        )?;
        Ok(())
    }

    fn insert_price_point(&self, point: &PricePoint) -> Result<i64> {
        let id: i64 = self
            .conn()
            .query_row(
                r#"INSERT INTO price_points
                       (ean, marketplace_domain, marketplace_item_id, price, currency, sell_date, recorded_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?)
                   RETURNING id"#,
                params![
                    point.ean,
                    point.marketplace_domain,
                    point.marketplace_item_id,
                    point.price,
                    point.currency,
                    point.sell_date,
                    Utc::now().naive_utc(),
                ],
                |r| r.get(0),
            )
            .with_context(|| format!("insert price point {} @ {}", point.ean, point.marketplace_domain))?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cpu;
    use std::collections::BTreeMap;

    fn repo() -> Repository {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        repo
    }

    #[test]
    fn test_entity_upsert_and_lookup() {
        let repo = repo();
        let mut entity = HardwareEntity::Cpu(Cpu {
            model_name: "AMD Ryzen 5 7600".into(),
            manufacturer: "AMD".into(),
            cores: 6,
            ..Default::default()
        });
        let key = entity.model_key().unwrap();

        assert!(repo.find_by_model_key(&key).unwrap().is_none());
        repo.upsert(&entity).unwrap();
        assert_eq!(repo.find_by_model_key(&key).unwrap(), Some(entity.clone()));

        if let HardwareEntity::Cpu(cpu) = &mut entity {
            cpu.threads = 12;
        }
        repo.upsert(&entity).unwrap();
        assert_eq!(repo.find_by_model_key(&key).unwrap(), Some(entity));
        assert_eq!(repo.counts().unwrap().entities, 1);
    }

    #[test]
    fn test_benchmark_unique_per_source_and_model() {
        let repo = repo();
        let mut result = BenchmarkResult {
            category: HardwareCategory::Cpu,
            source: "cinebench-r23".into(),
            model_name: "AMD Ryzen 7 7800X3D".into(),
            scores: BTreeMap::from([("multi_thread".to_string(), 18_200.0)]),
        };
        repo.upsert_benchmark(&result).unwrap();
        result.scores.insert("single_thread".into(), 1_780.0);
        repo.upsert_benchmark(&result).unwrap();

        assert_eq!(repo.counts().unwrap().benchmarks, 1);
        let stored = repo.find_benchmark("cinebench-r23", "AMD Ryzen 7 7800X3D").unwrap().unwrap();
        assert_eq!(stored.scores.len(), 2);
    }

    #[test]
    fn test_price_points_are_append_only() {
        let repo = repo();
        let point = PricePoint {
            ean: "0730143314442".into(),
            marketplace_domain: "allegro.pl".into(),
            marketplace_item_id: "13582417741".into(),
            price: 1_699.0,
            currency: "PLN".into(),
            sell_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        };
        let a = repo.insert_price_point(&point).unwrap();
        let b = repo.insert_price_point(&point).unwrap();

        assert_ne!(a, b);
        assert_eq!(repo.price_points_for_ean("0730143314442").unwrap(), vec![point.clone(), point]);
    }

    #[test]
    fn test_scrape_run_log() {
        let repo = repo();
        let id = repo.begin_scrape_run(2).unwrap();
        repo.finish_scrape_run(id, 3, 1, None).unwrap();
        let second = repo.begin_scrape_run(1).unwrap();
        assert!(second > id);
    }
}
