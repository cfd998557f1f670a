mod classify;
mod fetch;
mod filter;
mod listing;
mod runs;

use std::time::Instant;

use fundscreen_warehouse::{Warehouse, WarehouseConfig};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::metadata::{Envelope, Metadata, RunId};

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }
}

pub async fn run(cli: &Cli) -> Result<Envelope<Value>, CliError> {
    let run_id = RunId::new_v4();
    let started = Instant::now();

    let (command, result) = match &cli.command {
        Command::Fetch(args) => ("fetch", fetch::run(args, cli, run_id).await?),
        Command::Classify => ("classify", classify::run(&open_warehouse(cli)?)?),
        Command::Filter(args) => ("filter", filter::run(args, &open_warehouse(cli)?)?),
        Command::Sectors => ("sectors", listing::sectors(&open_warehouse(cli)?)?),
        Command::Industries => ("industries", listing::industries(&open_warehouse(cli)?)?),
        Command::Runs(args) => ("runs", runs::run(args, &open_warehouse(cli)?)?),
    };

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let mut meta = Metadata::new(command, run_id, latency_ms);
    for warning in result.warnings {
        meta.push_warning(warning);
    }

    Ok(Envelope {
        meta,
        data: result.data,
    })
}

fn open_warehouse(cli: &Cli) -> Result<Warehouse, CliError> {
    let config = match &cli.home {
        Some(home) => WarehouseConfig::for_home(home.clone()),
        None => WarehouseConfig::default(),
    };
    tracing::debug!(path = %config.db_path.display(), "opening warehouse");
    Ok(Warehouse::open(config)?)
}
