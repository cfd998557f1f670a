//! Behavior-driven tests for CLI user journeys.
//!
//! These tests drive the `fundscreen` binary in offline mode against a
//! temporary data home and check WHAT a user sees on stdout and through
//! exit codes.

use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::{tempdir, TempDir};

fn fundscreen(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fundscreen"))
        .arg("--mock")
        .arg("--home")
        .arg(home)
        .args(args)
        .env_remove("FUNDSCREEN_MAX_WORKERS")
        .env("RUST_LOG", "off")
        .output()
        .expect("binary runs")
}

fn envelope(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is one JSON envelope")
}

fn workspace_with_universe(contents: &str) -> (TempDir, std::path::PathBuf) {
    let temp = tempdir().expect("tempdir");
    let universe = temp.path().join("universe.txt");
    std::fs::write(&universe, contents).expect("write universe");
    (temp, universe)
}

// =============================================================================
// CLI User Journey: Fetch and Screen
// =============================================================================

#[test]
fn user_can_fetch_a_universe_and_screen_it_by_sector() {
    // Given: A universe of six listings
    let (temp, universe) = workspace_with_universe("AAPL\nMSFT\nXOM\nJPM\nCNI\nNVDA\n");
    let home = temp.path().join("home");
    let universe = universe.to_str().expect("utf-8 path");

    // When: They fetch it and list the stored sectors
    let fetched = fundscreen(&home, &["fetch", "--universe", universe, "--workers", "3"]);
    let sectors = fundscreen(&home, &["sectors"]);

    // Then: Every listing is produced and at least one sector is stored
    assert!(fetched.status.success(), "fetch should succeed");
    let fetched = envelope(&fetched);
    assert_eq!(fetched["meta"]["command"], "fetch");
    assert_eq!(fetched["data"]["produced"], 6);
    assert_eq!(fetched["data"]["persisted"], true);

    let sectors = envelope(&sectors);
    let first_sector = sectors["data"]["sectors"][0]
        .as_str()
        .expect("at least one sector")
        .to_owned();

    // And: Filtering by that sector returns only its members
    let filter = format!(r#"{{"sector": "{first_sector}"}}"#);
    let screened = envelope(&fundscreen(&home, &["filter", "--filters", &filter]));
    let rows = screened["data"]["rows"].as_array().expect("rows array");
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|row| row["sector"] == first_sector.as_str()));
    assert_eq!(screened["data"]["total"], 6);
}

#[test]
fn user_sees_highlight_labels_when_asking_for_them() {
    // Given: A fetched universe
    let (temp, universe) = workspace_with_universe("AAPL\nMSFT\nXOM\n");
    let home = temp.path().join("home");
    let fetched = fundscreen(&home, &["fetch", "--universe", universe.to_str().expect("utf-8")]);
    assert!(fetched.status.success());

    // When: They screen with --highlights
    let screened = envelope(&fundscreen(&home, &["filter", "--highlights"]));

    // Then: Every row carries a label per metric
    let rows = screened["data"]["rows"].as_array().expect("rows array");
    assert_eq!(rows.len(), 3);
    for row in rows {
        let label = row["highlights"]["labels"]["pe_ratio"]
            .as_str()
            .expect("pe_ratio label");
        assert!(["above", "within", "below"].contains(&label));
    }
}

#[test]
fn user_can_find_a_fetch_in_the_run_log() {
    // Given: One completed fetch
    let (temp, universe) = workspace_with_universe("AAPL\nMSFT\n");
    let home = temp.path().join("home");
    let fetched = envelope(&fundscreen(
        &home,
        &["fetch", "--universe", universe.to_str().expect("utf-8")],
    ));

    // When: They list recent runs
    let runs = envelope(&fundscreen(&home, &["runs", "--limit", "5"]));

    // Then: The run log entry shares the fetch envelope's run id
    let logged = &runs["data"]["runs"][0];
    assert_eq!(logged["run_id"], fetched["meta"]["run_id"]);
    assert_eq!(logged["provider"], "fixture");
    assert_eq!(logged["requested"], 2);
    assert_eq!(logged["cancelled"], false);
}

// =============================================================================
// CLI User Journey: Errors and Exit Codes
// =============================================================================

#[test]
fn user_gets_usage_exit_code_for_a_malformed_filter_request() {
    // Given: An empty data home
    let temp = tempdir().expect("tempdir");

    // When: They pass a filter request that is not a JSON object
    let output = fundscreen(temp.path(), &["filter", "--filters", "[1, 2]"]);

    // Then: The command fails with exit code 2 and prints nothing on stdout
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
}

#[test]
fn user_in_strict_mode_fails_on_rejected_universe_entries() {
    // Given: A universe with one unusable entry
    let (temp, universe) = workspace_with_universe("AAPL\n$$$\n");
    let home = temp.path().join("home");

    // When: They fetch in strict mode
    let output = fundscreen(
        &home,
        &["--strict", "fetch", "--universe", universe.to_str().expect("utf-8")],
    );

    // Then: The envelope is still printed, with a warning, and the exit code is 5
    assert_eq!(output.status.code(), Some(5));
    let printed = envelope(&output);
    assert_eq!(printed["data"]["rejected"][0]["raw"], "$$$");
    assert!(!printed["meta"]["warnings"]
        .as_array()
        .expect("warnings array")
        .is_empty());
}

#[test]
fn user_gets_an_empty_screen_before_any_fetch() {
    // Given: A fresh data home
    let temp = tempdir().expect("tempdir");

    // When: They list sectors and filter
    let sectors = envelope(&fundscreen(temp.path(), &["sectors"]));
    let screened = envelope(&fundscreen(temp.path(), &["filter"]));

    // Then: Both succeed with empty results and a hint to fetch first
    assert_eq!(sectors["data"]["sectors"], Value::Array(Vec::new()));
    assert_eq!(screened["data"]["matched"], 0);
    assert_eq!(
        screened["meta"]["warnings"][0],
        "no stored metrics; run `fundscreen fetch` first"
    );
}
