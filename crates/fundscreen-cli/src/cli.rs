//! Command-line arguments for `fundscreen`.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fetch` | Fetch a universe, derive metrics, classify and store them |
//! | `classify` | Re-run sector classification over stored metrics |
//! | `filter` | Screen stored rows with a JSON filter request |
//! | `sectors` | List stored sectors |
//! | `industries` | List stored industries |
//! | `runs` | Show recent fetch runs |

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use fundscreen_core::Exchange;

/// Fundamentals screener with sector-relative highlights.
#[derive(Debug, Parser)]
#[command(name = "fundscreen", author, version, about)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Treat warnings as failures (exit code 5).
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    /// Data directory. Defaults to `$FUNDSCREEN_HOME`, then `~/.fundscreen`.
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Debug-level logging on stderr.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Use generated offline data instead of the live provider.
    #[arg(long, global = true, default_value_t = false)]
    pub mock: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Ndjson,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch every symbol in a universe file and store the screen.
    ///
    ///   fundscreen fetch --universe tsx.csv --exchange tsx --workers 8
    Fetch(FetchArgs),

    /// Recompute sector baselines and highlights from stored metrics.
    Classify,

    /// Screen stored rows.
    ///
    ///   fundscreen filter --filters '{"sector": "Energy", "pe_ratio": [null, 15]}'
    ///   fundscreen filter --filters-file value.json --highlights
    Filter(FilterArgs),

    /// List distinct stored sectors.
    Sectors,

    /// List distinct stored industries.
    Industries,

    /// Show recent fetch runs, newest first.
    Runs(RunsArgs),
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Plain list or CSV with a `Ticker` column.
    #[arg(long)]
    pub universe: PathBuf,

    /// Listing venue; converts listing tickers to provider symbols.
    #[arg(long)]
    pub exchange: Option<Exchange>,

    /// Concurrent fetches. Defaults to `$FUNDSCREEN_MAX_WORKERS`, then 10.
    #[arg(long)]
    pub workers: Option<usize>,
}

#[derive(Debug, Args)]
pub struct FilterArgs {
    /// Filter request as a JSON object.
    #[arg(long, conflicts_with = "filters_file")]
    pub filters: Option<String>,

    /// Path to a JSON filter request.
    #[arg(long)]
    pub filters_file: Option<PathBuf>,

    /// Include highlight labels on each row.
    #[arg(long, default_value_t = false)]
    pub highlights: bool,
}

#[derive(Debug, Args)]
pub struct RunsArgs {
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}
