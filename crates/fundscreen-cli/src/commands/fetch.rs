use std::collections::BTreeSet;
use std::sync::Arc;

use fundscreen_core::{
    classify, load_universe, DataSource, FetchFailure, FetchOrchestrator, FixtureSource,
    PipelineConfig, ProviderId, RejectedEntry, YahooAdapter,
};
use fundscreen_warehouse::RunLogEntry;
use serde::Serialize;
use time::OffsetDateTime;

use crate::cli::{Cli, FetchArgs};
use crate::error::CliError;
use crate::metadata::RunId;

use super::{open_warehouse, CommandResult};

#[derive(Debug, Serialize)]
struct FetchResponseData {
    provider: ProviderId,
    requested: usize,
    produced: usize,
    skipped: usize,
    not_started: usize,
    cancelled: bool,
    persisted: bool,
    sectors: usize,
    elapsed_ms: u64,
    failures: Vec<FetchFailure>,
    rejected: Vec<RejectedEntry>,
}

pub async fn run(args: &FetchArgs, cli: &Cli, run_id: RunId) -> Result<CommandResult, CliError> {
    let universe = load_universe(&args.universe, args.exchange)?;
    let mut warnings = universe
        .rejected
        .iter()
        .map(|entry| format!("rejected universe entry '{}': {}", entry.raw, entry.reason))
        .collect::<Vec<_>>();
    if universe.symbols.is_empty() {
        warnings.push(String::from("universe file contains no symbols"));
    }

    let mut config = PipelineConfig::from_env();
    if let Some(workers) = args.workers {
        config = config.with_max_workers(workers)?;
    }

    let (provider, source): (ProviderId, Arc<dyn DataSource>) = if cli.mock {
        (
            ProviderId::Fixture,
            Arc::new(FixtureSource::demo(universe.symbols.iter())),
        )
    } else {
        (ProviderId::Yahoo, Arc::new(YahooAdapter::default()))
    };

    // Opened up front so a bad data home fails before any network work.
    let warehouse = open_warehouse(cli)?;

    let orchestrator = FetchOrchestrator::new(source, config);
    let stop = orchestrator.stop_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing in-flight fetches");
            stop.stop();
        }
    });

    let started_at = OffsetDateTime::now_utc();
    let report = orchestrator.run(&universe.symbols).await;
    let finished_at = OffsetDateTime::now_utc();
    interrupt.abort();

    let persisted = !report.cancelled;
    let mut sectors = 0;
    if persisted {
        let classification = classify(&report.records);
        sectors = classification
            .highlights
            .iter()
            .map(|highlight| highlight.sector.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        warehouse.replace_screen(&report.records, &classification)?;
    } else {
        warnings.push(format!(
            "run cancelled with {} identifiers not started; stored screen left unchanged",
            report.not_started
        ));
    }
    if report.skipped > 0 {
        warnings.push(format!("{} identifiers skipped", report.skipped));
    }

    warehouse.record_run(&RunLogEntry::from_report(
        run_id.to_string(),
        provider,
        started_at,
        finished_at,
        &report,
    ))?;

    let data = serde_json::to_value(FetchResponseData {
        provider,
        requested: report.requested,
        produced: report.records.len(),
        skipped: report.skipped,
        not_started: report.not_started,
        cancelled: report.cancelled,
        persisted,
        sectors,
        elapsed_ms: report.elapsed_ms,
        failures: report.failures,
        rejected: universe.rejected,
    })?;

    Ok(CommandResult::ok(data).with_warnings(warnings))
}
