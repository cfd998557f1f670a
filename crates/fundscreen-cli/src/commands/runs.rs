use fundscreen_warehouse::Warehouse;

use crate::cli::RunsArgs;
use crate::error::CliError;

use super::CommandResult;

pub fn run(args: &RunsArgs, warehouse: &Warehouse) -> Result<CommandResult, CliError> {
    let runs = warehouse.recent_runs(args.limit)?;
    Ok(CommandResult::ok(serde_json::json!({ "runs": serde_json::to_value(runs)? })))
}
