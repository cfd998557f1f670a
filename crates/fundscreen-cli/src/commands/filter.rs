use std::fs;

use fundscreen_core::{filter, FilterKey, FilterRequest, ScreenRow};
use fundscreen_warehouse::Warehouse;
use serde::Serialize;

use crate::cli::FilterArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct FilterResponseData<R> {
    total: usize,
    matched: usize,
    predicates: usize,
    rows: Vec<R>,
}

pub fn run(args: &FilterArgs, warehouse: &Warehouse) -> Result<CommandResult, CliError> {
    let request = match (&args.filters, &args.filters_file) {
        (Some(inline), _) => FilterRequest::from_json_str(inline)?,
        (None, Some(path)) => FilterRequest::from_json_str(&fs::read_to_string(path)?)?,
        (None, None) => FilterRequest::new(),
    };

    let mut warnings = Vec::new();
    let uses_highlights = request
        .predicates()
        .any(|(key, _)| matches!(key.parse::<FilterKey>(), Ok(FilterKey::Highlight(_))));
    if uses_highlights && !args.highlights {
        warnings.push(String::from(
            "highlight predicates are ignored without --highlights",
        ));
    }

    let data = if args.highlights {
        screen(&warehouse.load_screen_rows()?, &request)?
    } else {
        screen(&warehouse.load_metrics()?, &request)?
    };

    if data.get("total").and_then(serde_json::Value::as_u64) == Some(0) {
        warnings.push(String::from("no stored metrics; run `fundscreen fetch` first"));
    }

    Ok(CommandResult::ok(data).with_warnings(warnings))
}

fn screen<R>(rows: &[R], request: &FilterRequest) -> Result<serde_json::Value, CliError>
where
    R: ScreenRow + Clone + Serialize,
{
    let kept = filter(rows, request);
    tracing::debug!(total = rows.len(), matched = kept.len(), "applied filter request");
    Ok(serde_json::to_value(FilterResponseData {
        total: rows.len(),
        matched: kept.len(),
        predicates: request.len(),
        rows: kept,
    })?)
}
