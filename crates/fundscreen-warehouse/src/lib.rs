//! Embedded `DuckDB` store for fundscreen.
//!
//! Holds the latest metrics table, the classifier output (highlights and
//! sector baselines) and a log of fetch runs. Every write replaces a whole
//! table inside one transaction, so readers never see a half-written run.

pub mod duckdb;
pub mod migrations;
pub mod views;

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::types::Value as DuckValue;
use ::duckdb::{params_from_iter, Connection, Row};
use fundscreen_core::{
    normalize_category, normalize_optional, Classification, FetchReport, Highlight,
    HighlightRecord, JoinedRow, MetricField, MetricRecord, ProviderId, SectorBaseline, Symbol,
    ValidationError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

pub use duckdb::{DuckDbConnectionManager, PooledConnection};

/// Environment variable naming the data home directory.
pub const HOME_ENV: &str = "FUNDSCREEN_HOME";

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid stored value in {table}.{column}: {value}")]
    InvalidStoredValue {
        table: &'static str,
        column: String,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub home: PathBuf,
    pub db_path: PathBuf,
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::for_home(resolve_home())
    }
}

impl WarehouseConfig {
    /// Store under `<home>/cache/warehouse.duckdb`.
    pub fn for_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let db_path = home.join("cache").join("warehouse.duckdb");
        Self {
            home,
            db_path,
            max_pool_size: 4,
        }
    }
}

/// One fetch run as recorded in `run_log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub run_id: String,
    pub provider: ProviderId,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    pub requested: usize,
    pub produced: usize,
    pub skipped: usize,
    pub not_started: usize,
    pub cancelled: bool,
}

impl RunLogEntry {
    pub fn from_report(
        run_id: impl Into<String>,
        provider: ProviderId,
        started_at: OffsetDateTime,
        finished_at: OffsetDateTime,
        report: &FetchReport,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            provider,
            started_at,
            finished_at,
            requested: report.requested,
            produced: report.records.len(),
            skipped: report.skipped,
            not_started: report.not_started,
            cancelled: report.cancelled,
        }
    }
}

#[derive(Clone)]
pub struct Warehouse {
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::new(config.db_path.clone(), config.max_pool_size);
        let warehouse = Self { manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        views::create_views(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    /// Runs `write` inside one transaction, rolling back when it fails.
    fn in_transaction<T>(
        &self,
        write: impl FnOnce(&Connection) -> Result<T, WarehouseError>,
    ) -> Result<T, WarehouseError> {
        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = write(&connection);
        finalize_transaction(&connection, result)
    }

    /// Replaces the stored metrics table with `records`.
    pub fn replace_metrics(&self, records: &[MetricRecord]) -> Result<usize, WarehouseError> {
        let written = self.in_transaction(|connection| write_metrics(connection, records))?;
        tracing::debug!(rows = written, "replaced metrics table");
        Ok(written)
    }

    /// Replaces metrics, highlights and baselines together, so a stored
    /// classification always belongs to the stored metrics.
    pub fn replace_screen(
        &self,
        records: &[MetricRecord],
        classification: &Classification,
    ) -> Result<usize, WarehouseError> {
        let written = self.in_transaction(|connection| {
            let written = write_metrics(connection, records)?;
            write_classification(connection, classification)?;
            Ok(written)
        })?;
        tracing::debug!(
            rows = written,
            highlights = classification.highlights.len(),
            "replaced stored screen"
        );
        Ok(written)
    }

    /// Stored metrics sorted by symbol, with category text re-normalized.
    pub fn load_metrics(&self) -> Result<Vec<MetricRecord>, WarehouseError> {
        let sql = format!(
            "SELECT {} FROM metrics ORDER BY symbol",
            metric_columns().join(", ")
        );

        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(&sql)?;
        let mut rows = statement.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(read_metric_row(row)?);
        }
        Ok(records)
    }

    /// Replaces stored highlights and sector baselines with `classification`.
    pub fn replace_classification(
        &self,
        classification: &Classification,
    ) -> Result<(), WarehouseError> {
        self.in_transaction(|connection| write_classification(connection, classification))?;
        tracing::debug!(
            highlights = classification.highlights.len(),
            baselines = classification.baselines.len(),
            "replaced classification tables"
        );
        Ok(())
    }

    /// Stored highlight rows sorted by symbol.
    pub fn load_highlights(&self) -> Result<Vec<HighlightRecord>, WarehouseError> {
        let sql = format!(
            "SELECT {} FROM highlights ORDER BY symbol",
            highlight_columns().join(", ")
        );

        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(&sql)?;
        let mut rows = statement.query([])?;
        let mut highlights = Vec::new();
        while let Some(row) = rows.next()? {
            let symbol: String = row.get(0)?;
            let sector: String = row.get(1)?;
            let mut record =
                HighlightRecord::neutral(Symbol::parse(&symbol)?, normalize_category(&sector));
            read_labels(row, 2, &mut record)?;
            highlights.push(record);
        }
        Ok(highlights)
    }

    /// Stored baselines sorted by sector, then field.
    pub fn load_baselines(&self) -> Result<Vec<SectorBaseline>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement =
            connection.prepare("SELECT sector, field, value FROM sector_baselines")?;
        let mut rows = statement.query([])?;
        let mut baselines = Vec::new();
        while let Some(row) = rows.next()? {
            let sector: String = row.get(0)?;
            let field: String = row.get(1)?;
            let value: Option<f64> = row.get(2)?;
            baselines.push(SectorBaseline {
                sector: normalize_category(&sector),
                field: field.parse()?,
                value,
            });
        }
        baselines.sort_by(|a, b| (&a.sector, a.field).cmp(&(&b.sector, b.field)));
        Ok(baselines)
    }

    /// Metrics joined with their highlight labels, sorted by symbol.
    pub fn load_screen_rows(&self) -> Result<Vec<JoinedRow>, WarehouseError> {
        let metric_count = metric_columns().len();
        let labels = MetricField::ALL
            .iter()
            .map(|field| field.highlight_column())
            .collect::<Vec<_>>();
        let sql = format!(
            "SELECT {metrics}, highlight_symbol, highlight_sector, {labels} FROM v_screen ORDER BY symbol",
            metrics = metric_columns().join(", "),
            labels = labels.join(", "),
        );

        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(&sql)?;
        let mut rows = statement.query([])?;
        let mut joined = Vec::new();
        while let Some(row) = rows.next()? {
            let metrics = read_metric_row(row)?;
            let highlight_symbol: Option<String> = row.get(metric_count)?;
            let highlights = match highlight_symbol {
                Some(_) => {
                    let sector: String = row.get(metric_count + 1)?;
                    let mut record = HighlightRecord::neutral(
                        metrics.symbol.clone(),
                        normalize_category(&sector),
                    );
                    read_labels(row, metric_count + 2, &mut record)?;
                    Some(record)
                }
                None => None,
            };
            joined.push(JoinedRow {
                metrics,
                highlights,
            });
        }
        Ok(joined)
    }

    pub fn record_run(&self, entry: &RunLogEntry) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        connection.execute(
            "INSERT OR REPLACE INTO run_log \
             (run_id, provider, started_at, finished_at, requested, produced, skipped, not_started, cancelled) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params_from_iter([
                DuckValue::Text(entry.run_id.clone()),
                DuckValue::Text(entry.provider.as_str().to_owned()),
                DuckValue::Text(format_timestamp(entry.started_at)?),
                DuckValue::Text(format_timestamp(entry.finished_at)?),
                DuckValue::BigInt(count_to_sql(entry.requested)),
                DuckValue::BigInt(count_to_sql(entry.produced)),
                DuckValue::BigInt(count_to_sql(entry.skipped)),
                DuckValue::BigInt(count_to_sql(entry.not_started)),
                DuckValue::Boolean(entry.cancelled),
            ]),
        )?;
        Ok(())
    }

    /// Most recent runs first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunLogEntry>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT run_id, provider, started_at, finished_at, requested, produced, skipped, \
             not_started, cancelled FROM run_log ORDER BY started_at DESC, run_id LIMIT ?",
        )?;
        let mut rows = statement.query([count_to_sql(limit)])?;
        let mut runs = Vec::new();
        while let Some(row) = rows.next()? {
            let provider: String = row.get(1)?;
            let started_at: String = row.get(2)?;
            let finished_at: String = row.get(3)?;
            runs.push(RunLogEntry {
                run_id: row.get(0)?,
                provider: provider.parse()?,
                started_at: parse_timestamp("started_at", &started_at)?,
                finished_at: parse_timestamp("finished_at", &finished_at)?,
                requested: count_from_sql(row.get(4)?),
                produced: count_from_sql(row.get(5)?),
                skipped: count_from_sql(row.get(6)?),
                not_started: count_from_sql(row.get(7)?),
                cancelled: row.get(8)?,
            });
        }
        Ok(runs)
    }

    /// Distinct non-empty sectors, normalized and sorted.
    pub fn distinct_sectors(&self) -> Result<Vec<String>, WarehouseError> {
        self.distinct_category("sector")
    }

    /// Distinct non-empty industries, normalized and sorted.
    pub fn distinct_industries(&self) -> Result<Vec<String>, WarehouseError> {
        self.distinct_category("industry")
    }

    fn distinct_category(&self, column: &'static str) -> Result<Vec<String>, WarehouseError> {
        let sql = format!("SELECT DISTINCT {column} FROM metrics WHERE {column} IS NOT NULL");
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(&sql)?;
        let mut rows = statement.query([])?;
        let mut values = BTreeSet::new();
        while let Some(row) = rows.next()? {
            let raw: String = row.get(0)?;
            if let Some(value) = normalize_optional(Some(&raw)) {
                values.insert(value);
            }
        }
        Ok(values.into_iter().collect())
    }
}

fn write_metrics(
    connection: &Connection,
    records: &[MetricRecord],
) -> Result<usize, WarehouseError> {
    let insert = format!(
        "INSERT INTO metrics ({columns}, updated_at) VALUES ({placeholders}, CURRENT_TIMESTAMP)",
        columns = metric_columns().join(", "),
        placeholders = placeholders(metric_columns().len()),
    );

    connection.execute_batch("DELETE FROM metrics")?;
    let mut statement = connection.prepare(&insert)?;
    for record in records {
        statement.execute(params_from_iter(metric_values(record)))?;
    }
    Ok(records.len())
}

fn write_classification(
    connection: &Connection,
    classification: &Classification,
) -> Result<(), WarehouseError> {
    let insert_highlight = format!(
        "INSERT INTO highlights ({columns}) VALUES ({placeholders})",
        columns = highlight_columns().join(", "),
        placeholders = placeholders(highlight_columns().len()),
    );

    connection.execute_batch("DELETE FROM highlights; DELETE FROM sector_baselines;")?;

    let mut statement = connection.prepare(&insert_highlight)?;
    for highlight in &classification.highlights {
        statement.execute(params_from_iter(highlight_values(highlight)))?;
    }

    let mut statement = connection
        .prepare("INSERT INTO sector_baselines (sector, field, value) VALUES (?, ?, ?)")?;
    for baseline in classification.baseline_rows() {
        statement.execute(params_from_iter([
            DuckValue::Text(baseline.sector),
            DuckValue::Text(baseline.field.column().to_owned()),
            double_or_null(baseline.value),
        ]))?;
    }
    Ok(())
}

fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Column order shared by metric inserts and reads.
fn metric_columns() -> Vec<&'static str> {
    let mut columns = vec!["symbol", "sector", "industry"];
    columns.extend(MetricField::ALL.iter().map(|field| field.column()));
    columns.push("recent_52_week_high");
    columns
}

fn highlight_columns() -> Vec<String> {
    let mut columns = vec![String::from("symbol"), String::from("sector")];
    columns.extend(MetricField::ALL.iter().map(|field| field.highlight_column()));
    columns
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn metric_values(record: &MetricRecord) -> Vec<DuckValue> {
    let mut values = vec![
        DuckValue::Text(record.symbol.as_str().to_owned()),
        text_or_null(record.sector.as_deref()),
        text_or_null(record.industry.as_deref()),
    ];
    values.extend(
        MetricField::ALL
            .iter()
            .map(|field| double_or_null(record.get(*field))),
    );
    values.push(DuckValue::Boolean(record.recent_52_week_high));
    values
}

fn highlight_values(highlight: &HighlightRecord) -> Vec<DuckValue> {
    let mut values = vec![
        DuckValue::Text(highlight.symbol.as_str().to_owned()),
        DuckValue::Text(highlight.sector.clone()),
    ];
    values.extend(
        MetricField::ALL
            .iter()
            .map(|field| DuckValue::Text(highlight.get(*field).as_str().to_owned())),
    );
    values
}

fn read_metric_row(row: &Row<'_>) -> Result<MetricRecord, WarehouseError> {
    let symbol: String = row.get(0)?;
    let sector: Option<String> = row.get(1)?;
    let industry: Option<String> = row.get(2)?;

    let mut record = MetricRecord::empty(Symbol::parse(&symbol)?);
    record.sector = normalize_optional(sector.as_deref());
    record.industry = normalize_optional(industry.as_deref());
    for (offset, field) in MetricField::ALL.iter().enumerate() {
        record.set(*field, row.get(3 + offset)?);
    }
    record.recent_52_week_high = row.get(3 + MetricField::ALL.len())?;
    Ok(record)
}

fn read_labels(
    row: &Row<'_>,
    first: usize,
    record: &mut HighlightRecord,
) -> Result<(), WarehouseError> {
    for (offset, field) in MetricField::ALL.iter().enumerate() {
        let raw: Option<String> = row.get(first + offset)?;
        let Some(raw) = raw else {
            continue;
        };
        let label = raw
            .parse::<Highlight>()
            .map_err(|_| WarehouseError::InvalidStoredValue {
                table: "highlights",
                column: field.highlight_column(),
                value: raw.clone(),
            })?;
        record.labels.insert(*field, label);
    }
    Ok(())
}

fn text_or_null(value: Option<&str>) -> DuckValue {
    value.map_or(DuckValue::Null, |value| DuckValue::Text(value.to_owned()))
}

/// NaN and infinities are stored as NULL.
fn double_or_null(value: Option<f64>) -> DuckValue {
    value
        .filter(|value| value.is_finite())
        .map_or(DuckValue::Null, DuckValue::Double)
}

fn count_to_sql(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn count_from_sql(value: i64) -> usize {
    usize::try_from(value).unwrap_or_default()
}

fn format_timestamp(value: OffsetDateTime) -> Result<String, WarehouseError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .map_err(|error| WarehouseError::InvalidStoredValue {
            table: "run_log",
            column: String::from("timestamp"),
            value: error.to_string(),
        })
}

fn parse_timestamp(column: &str, value: &str) -> Result<OffsetDateTime, WarehouseError> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|_| WarehouseError::InvalidStoredValue {
        table: "run_log",
        column: column.to_owned(),
        value: value.to_owned(),
    })
}

fn resolve_home() -> PathBuf {
    if let Some(path) = env::var_os(HOME_ENV) {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".fundscreen");
    }

    PathBuf::from(".fundscreen")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fundscreen_core::classify;
    use tempfile::tempdir;

    fn open_temp() -> (tempfile::TempDir, Warehouse) {
        let temp = tempdir().expect("tempdir");
        let warehouse = Warehouse::open(WarehouseConfig::for_home(temp.path().join("home")))
            .expect("warehouse open");
        (temp, warehouse)
    }

    #[test]
    fn initializes_tables_and_views() {
        let (_temp, warehouse) = open_temp();
        let connection = warehouse.manager.acquire().expect("connection");

        let tables: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_name IN ('metrics', 'highlights', 'sector_baselines', 'run_log', 'v_screen')",
                [],
                |row| row.get(0),
            )
            .expect("query");
        assert_eq!(tables, 5);
        assert!(warehouse.db_path().ends_with("cache/warehouse.duckdb"));
    }

    #[test]
    fn non_finite_values_are_stored_as_null() {
        let (_temp, warehouse) = open_temp();
        let mut record = MetricRecord::empty(Symbol::parse("NAN").expect("symbol"));
        record.pe_ratio = Some(f64::NAN);
        record.pb_ratio = Some(f64::INFINITY);
        record.roe = Some(12.5);

        warehouse.replace_metrics(&[record]).expect("write");
        let loaded = warehouse.load_metrics().expect("read");

        assert_eq!(loaded[0].pe_ratio, None);
        assert_eq!(loaded[0].pb_ratio, None);
        assert_eq!(loaded[0].roe, Some(12.5));
    }

    #[test]
    fn screen_write_failing_after_metrics_keeps_previous_screen() {
        let (_temp, warehouse) = open_temp();
        let mut keep = MetricRecord::empty(Symbol::parse("KEEP").expect("symbol"));
        keep.sector = Some(String::from("Energy"));
        let kept = vec![keep];
        warehouse
            .replace_screen(&kept, &classify(&kept))
            .expect("first write");

        let replacement = vec![MetricRecord::empty(Symbol::parse("NEW").expect("symbol"))];
        let result = warehouse.in_transaction(|connection| {
            write_metrics(connection, &replacement)?;
            Err::<(), _>(WarehouseError::InvalidStoredValue {
                table: "highlights",
                column: String::from("symbol"),
                value: String::from("forced"),
            })
        });
        assert!(result.is_err());

        let symbols = warehouse
            .load_metrics()
            .expect("read")
            .into_iter()
            .map(|record| record.symbol.as_str().to_owned())
            .collect::<Vec<_>>();
        assert_eq!(symbols, vec!["KEEP"]);
        let highlights = warehouse.load_highlights().expect("read highlights");
        assert_eq!(highlights.len(), 1);
        assert_eq!(highlights[0].symbol.as_str(), "KEEP");
    }

    #[test]
    fn database_lives_under_the_home_cache_dir() {
        assert_eq!(
            WarehouseConfig::for_home("/tmp/fs-home").db_path,
            PathBuf::from("/tmp/fs-home/cache/warehouse.duckdb")
        );
    }
}
