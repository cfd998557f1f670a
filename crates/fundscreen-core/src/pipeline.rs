//! Concurrent fetch orchestration.
//!
//! Every identifier in the universe is assembled by its own tokio task, with
//! at most [`PipelineConfig::max_workers`] tasks in flight. A failed or
//! panicked task only removes its own identifier from the report.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::assemble::assemble_record;
use crate::config::PipelineConfig;
use crate::data_source::{DataSource, SourceError};
use crate::{MetricRecord, Symbol};

/// Cooperative stop signal shared with a running fetch.
///
/// Stopping lets in-flight identifiers finish and schedules nothing new.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Identifier dropped from a run, with the provider's reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub symbol: Symbol,
    pub code: String,
    pub message: String,
}

impl FetchFailure {
    fn new(symbol: Symbol, error: &SourceError) -> Self {
        Self {
            symbol,
            code: error.code().to_owned(),
            message: error.message().to_owned(),
        }
    }
}

/// Outcome of one fetch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchReport {
    /// Assembled records, sorted by identifier.
    pub records: Vec<MetricRecord>,
    /// Identifiers attempted but not produced.
    pub skipped: usize,
    /// Skipped identifiers whose failure reason is known.
    pub failures: Vec<FetchFailure>,
    /// Whether a stop left identifiers unscheduled.
    pub cancelled: bool,
    /// Identifiers never scheduled because the run was stopped.
    pub not_started: usize,
    /// Distinct identifiers requested.
    pub requested: usize,
    pub elapsed_ms: u64,
}

/// Runs the record assembler across a universe with bounded parallelism.
pub struct FetchOrchestrator {
    source: Arc<dyn DataSource>,
    config: PipelineConfig,
    stop: StopHandle,
}

impl FetchOrchestrator {
    pub fn new(source: Arc<dyn DataSource>, config: PipelineConfig) -> Self {
        Self {
            source,
            config,
            stop: StopHandle::new(),
        }
    }

    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetches each distinct identifier once; no identifier is retried.
    pub async fn run(&self, universe: &[Symbol]) -> FetchReport {
        let started = Instant::now();
        let mut seen = HashSet::with_capacity(universe.len());
        let unique = universe
            .iter()
            .filter(|symbol| seen.insert(*symbol))
            .cloned()
            .collect::<Vec<_>>();
        let requested = unique.len();
        let max_workers = self.config.max_workers.max(1);

        info!(
            provider = %self.source.id(),
            requested,
            max_workers,
            "starting fetch run"
        );

        let mut report = FetchReport {
            requested,
            ..FetchReport::default()
        };
        let mut pending = unique.into_iter();
        let mut tasks = JoinSet::new();

        loop {
            while tasks.len() < max_workers && !self.stop.is_stopped() {
                let Some(symbol) = pending.next() else {
                    break;
                };
                let source = Arc::clone(&self.source);
                let config = self.config;
                tasks.spawn(async move {
                    let result = assemble_record(source.as_ref(), &symbol, &config).await;
                    (symbol, result)
                });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };

            match joined {
                Ok((_, Ok(record))) => report.records.push(record),
                Ok((symbol, Err(error))) => {
                    warn!(
                        symbol = %symbol,
                        code = error.code(),
                        "skipping identifier: {}",
                        error.message()
                    );
                    report.skipped += 1;
                    report.failures.push(FetchFailure::new(symbol, &error));
                }
                Err(error) => {
                    warn!("fetch task failed: {error}");
                    report.skipped += 1;
                }
            }
        }

        report.not_started = pending.count();
        // A stop that arrives after everything was scheduled cut nothing short.
        report.cancelled = self.stop.is_stopped() && report.not_started > 0;
        report.records.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        report.failures.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            requested = report.requested,
            produced = report.records.len(),
            skipped = report.skipped,
            not_started = report.not_started,
            cancelled = report.cancelled,
            elapsed_ms = report.elapsed_ms,
            "fetch run finished"
        );

        report
    }
}

/// Fetches and derives records for `universe` using `source`.
pub async fn run_fetch_and_derive(
    source: Arc<dyn DataSource>,
    universe: &[Symbol],
    config: PipelineConfig,
) -> FetchReport {
    FetchOrchestrator::new(source, config).run(universe).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FixtureCompany, FixtureSource};
    use crate::CompanySnapshot;
    use std::time::Duration;

    fn symbol(raw: &str) -> Symbol {
        Symbol::parse(raw).expect("valid symbol")
    }

    fn company(market_cap: f64) -> FixtureCompany {
        FixtureCompany::new(CompanySnapshot::new().with("marketCap", market_cap))
    }

    #[tokio::test]
    async fn stop_before_start_schedules_nothing() {
        let a = symbol("A");
        let source = Arc::new(FixtureSource::new().with_company(a.clone(), company(1.0)));
        let orchestrator = FetchOrchestrator::new(source, PipelineConfig::default());
        orchestrator.stop_handle().stop();

        let report = orchestrator.run(&[a.clone(), symbol("B")]).await;

        assert!(report.cancelled);
        assert!(report.records.is_empty());
        assert_eq!(report.not_started, 2);
        assert_eq!(report.skipped, 0);
    }

    #[tokio::test]
    async fn stop_lets_in_flight_work_finish() {
        let symbols = ["A", "B", "C", "D", "E", "F"].map(symbol);
        let source = symbols
            .iter()
            .fold(FixtureSource::new(), |source, s| {
                source.with_company(s.clone(), company(1.0))
            })
            .with_latency(Duration::from_millis(80));
        let config = PipelineConfig::default()
            .with_max_workers(2)
            .expect("positive worker count");
        let orchestrator = FetchOrchestrator::new(Arc::new(source), config);
        let stop = orchestrator.stop_handle();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stop.stop();
        });
        let report = orchestrator.run(&symbols).await;

        assert!(report.cancelled);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.not_started, 4);
    }

    #[tokio::test]
    async fn stop_after_everything_was_scheduled_is_a_complete_run() {
        let symbols = ["A", "B"].map(symbol);
        let source = symbols
            .iter()
            .fold(FixtureSource::new(), |source, s| {
                source.with_company(s.clone(), company(1.0))
            })
            .with_latency(Duration::from_millis(80));
        let orchestrator = FetchOrchestrator::new(Arc::new(source), PipelineConfig::default());
        let stop = orchestrator.stop_handle();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stop.stop();
        });
        let report = orchestrator.run(&symbols).await;

        assert!(!report.cancelled);
        assert_eq!(report.not_started, 0);
        assert_eq!(report.records.len(), 2);
    }
}
