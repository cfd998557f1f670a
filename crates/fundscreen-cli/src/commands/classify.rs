use fundscreen_core::{classify, SectorBaseline};
use fundscreen_warehouse::Warehouse;
use serde::Serialize;

use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct ClassifyResponseData {
    classified: usize,
    unclassified: usize,
    baselines: Vec<SectorBaseline>,
}

pub fn run(warehouse: &Warehouse) -> Result<CommandResult, CliError> {
    let records = warehouse.load_metrics()?;
    let classification = classify(&records);
    warehouse.replace_classification(&classification)?;

    let classified = classification.highlights.len();
    let data = serde_json::to_value(ClassifyResponseData {
        classified,
        unclassified: records.len() - classified,
        baselines: classification.baseline_rows(),
    })?;

    let mut result = CommandResult::ok(data);
    if records.is_empty() {
        result = result.with_warning("no stored metrics; run `fundscreen fetch` first");
    }
    Ok(result)
}
