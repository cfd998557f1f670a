use fundscreen_warehouse::Warehouse;
use serde_json::json;

use crate::error::CliError;

use super::CommandResult;

pub fn sectors(warehouse: &Warehouse) -> Result<CommandResult, CliError> {
    let sectors = warehouse.distinct_sectors()?;
    Ok(CommandResult::ok(json!({ "sectors": sectors })))
}

pub fn industries(warehouse: &Warehouse) -> Result<CommandResult, CliError> {
    let industries = warehouse.distinct_industries()?;
    Ok(CommandResult::ok(json!({ "industries": industries })))
}
