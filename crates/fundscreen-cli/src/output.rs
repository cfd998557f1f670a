use serde::Serialize;
use serde_json::Value;

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::metadata::{Envelope, Metadata};

#[derive(Serialize)]
struct MetaLine<'a> {
    meta: &'a Metadata,
}

pub fn render(
    envelope: &Envelope<Value>,
    format: OutputFormat,
    pretty: bool,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(envelope)?
            } else {
                serde_json::to_string(envelope)?
            };
            println!("{payload}");
        }
        OutputFormat::Ndjson => {
            for line in ndjson_lines(envelope)? {
                println!("{line}");
            }
        }
        OutputFormat::Table => render_table(envelope)?,
    }

    Ok(())
}

/// Meta on the first line, then one line per row when the payload carries
/// a `rows` array; otherwise the whole data value on one line.
fn ndjson_lines(envelope: &Envelope<Value>) -> Result<Vec<String>, CliError> {
    let mut lines = vec![serde_json::to_string(&MetaLine {
        meta: &envelope.meta,
    })?];
    match envelope.data.get("rows").and_then(Value::as_array) {
        Some(rows) => {
            for row in rows {
                lines.push(serde_json::to_string(row)?);
            }
        }
        None => lines.push(serde_json::to_string(&envelope.data)?),
    }
    Ok(lines)
}

fn render_table(envelope: &Envelope<Value>) -> Result<(), CliError> {
    println!("command     : {}", envelope.meta.command);
    println!("run_id      : {}", envelope.meta.run_id);
    println!("generated_at: {}", envelope.meta.generated_at);
    println!("latency_ms  : {}", envelope.meta.latency_ms);

    if !envelope.meta.warnings.is_empty() {
        println!("warnings:");
        for warning in &envelope.meta.warnings {
            println!("  - {warning}");
        }
    }

    println!("data:");
    let pretty_data = serde_json::to_string_pretty(&envelope.data)?;
    for line in pretty_data.lines() {
        println!("  {line}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::RunId;

    #[test]
    fn ndjson_emits_one_line_per_row() {
        let envelope = Envelope {
            meta: Metadata::new("filter", RunId::new_v4(), 3),
            data: serde_json::json!({
                "matched": 2,
                "rows": [{ "symbol": "A" }, { "symbol": "B" }]
            }),
        };

        let lines = ndjson_lines(&envelope).expect("renders");

        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("\"command\":\"filter\""));
        assert_eq!(lines[2], r#"{"symbol":"B"}"#);
    }

    #[test]
    fn ndjson_without_rows_emits_data_once() {
        let envelope = Envelope {
            meta: Metadata::new("sectors", RunId::new_v4(), 1),
            data: serde_json::json!({ "sectors": ["Energy"] }),
        };

        let lines = ndjson_lines(&envelope).expect("renders");

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], r#"{"sectors":["Energy"]}"#);
    }
}
