//! Behavior-driven tests for screening.
//!
//! These tests verify HOW fetched records are classified against their
//! sector peers and narrowed down by filter requests.

use fundscreen_core::{
    classify, filter, normalize_category, Classification, FilterPredicate, FilterRequest,
    Highlight, JoinedRow, MetricField, MetricRecord,
};
use fundscreen_tests::symbol;

fn record(raw: &str, sector: Option<&str>) -> MetricRecord {
    let mut record = MetricRecord::empty(symbol(raw));
    record.sector = sector.map(str::to_owned);
    record
}

fn with_pe(raw: &str, sector: &str, pe: f64) -> MetricRecord {
    record(raw, Some(sector)).with(MetricField::PeRatio, pe)
}

fn label_of(classification: &Classification, raw: &str, field: MetricField) -> Highlight {
    classification
        .highlights
        .iter()
        .find(|highlight| highlight.symbol.as_str() == raw)
        .map(|highlight| highlight.get(field))
        .expect("symbol should be classified")
}

// =============================================================================
// Classifier: Baselines
// =============================================================================

#[test]
fn when_a_sector_has_an_extreme_outlier_baseline_moves_less_than_the_mean() {
    // Given: A tight peer group and the same group plus one extreme value
    let peers = [10.0, 11.0, 12.0, 13.0];
    let tight = peers
        .iter()
        .enumerate()
        .map(|(i, pe)| with_pe(&format!("P{i}"), "Utilities", *pe))
        .collect::<Vec<_>>();
    let mut with_outlier = tight.clone();
    with_outlier.push(with_pe("OUT", "Utilities", 400.0));

    // When: Both groups are classified
    let before = classify(&tight)
        .baseline("Utilities", MetricField::PeRatio)
        .expect("baseline exists");
    let after = classify(&with_outlier)
        .baseline("Utilities", MetricField::PeRatio)
        .expect("baseline exists");

    // Then: The baseline shift is smaller than the plain mean shift
    let mean_before = peers.iter().sum::<f64>() / 4.0;
    let mean_after = (peers.iter().sum::<f64>() + 400.0) / 5.0;
    assert!((after - before).abs() < (mean_after - mean_before).abs());
    assert_eq!(label_of(&classify(&with_outlier), "OUT", MetricField::PeRatio), Highlight::Above);
}

#[test]
fn when_sectors_differ_each_group_gets_its_own_baseline() {
    // Given: Two sectors with very different valuations
    let records = vec![
        with_pe("AAA", "Technology", 40.0),
        with_pe("BBB", "Technology", 42.0),
        with_pe("CCC", "Utilities", 12.0),
        with_pe("DDD", "Utilities", 14.0),
    ];

    // When: The records are classified
    let classification = classify(&records);

    // Then: Baselines are per sector and labels are relative to them
    assert_eq!(classification.baseline("Technology", MetricField::PeRatio), Some(41.0));
    assert_eq!(classification.baseline("Utilities", MetricField::PeRatio), Some(13.0));
    assert_eq!(label_of(&classification, "AAA", MetricField::PeRatio), Highlight::Within);
    assert_eq!(label_of(&classification, "CCC", MetricField::PeRatio), Highlight::Within);
}

#[test]
fn when_records_lack_a_sector_classifier_output_is_smaller_than_input() {
    // Given: Records with and without a sector
    let records = vec![
        with_pe("AAA", "Energy", 8.0),
        record("BBB", None).with(MetricField::PeRatio, 9.0),
        record("CCC", Some("")),
    ];

    // When: The records are classified
    let classification = classify(&records);

    // Then: Only sectored records are labelled
    assert!(classification.highlights.len() <= records.len());
    assert_eq!(classification.highlights.len(), 1);
    assert_eq!(classification.highlights[0].symbol.as_str(), "AAA");
}

#[test]
fn when_a_field_is_missing_the_label_is_within() {
    // Given: A sector where nobody reports PEG
    let records = vec![with_pe("AAA", "Energy", 8.0), with_pe("BBB", "Energy", 30.0)];

    // When: The records are classified
    let classification = classify(&records);

    // Then: PEG labels default to within and no PEG baseline is stored
    assert_eq!(label_of(&classification, "AAA", MetricField::PegRatio), Highlight::Within);
    assert_eq!(classification.baseline("Energy", MetricField::PegRatio), None);
    assert_eq!(label_of(&classification, "BBB", MetricField::PeRatio), Highlight::Above);
    assert_eq!(label_of(&classification, "AAA", MetricField::PeRatio), Highlight::Below);
}

#[test]
fn when_category_text_is_normalized_twice_result_is_unchanged() {
    // Given: Provider category strings with encoding and spacing quirks
    let samples = [
        "Banks\u{e2}\u{20ac}\u{201d}Regional",
        "REIT-Industrial",
        "Insurance—Life",
        "SemiconductorEquipment",
        "  Utilities ",
        "",
    ];

    for sample in samples {
        // When: The text is normalized once and then again
        let once = normalize_category(sample);
        let twice = normalize_category(&once);

        // Then: The second pass changes nothing
        assert_eq!(once, twice, "normalization of {sample:?} is not idempotent");
    }
}

// =============================================================================
// Filter Engine
// =============================================================================

#[test]
fn when_range_filter_applied_missing_values_never_match() {
    // Given: Rows with PE 5, 30, 60 and one without PE
    let rows = vec![
        with_pe("A", "Energy", 5.0),
        with_pe("B", "Energy", 30.0),
        with_pe("C", "Energy", 60.0),
        record("D", Some("Energy")),
    ];
    let request = FilterRequest::new().with("pe_ratio", FilterPredicate::between(10.0, 50.0));

    // When: The filter is applied
    let kept = filter(&rows, &request);

    // Then: Only the 30 row survives, unchanged
    assert_eq!(kept, vec![rows[1].clone()]);
}

#[test]
fn when_predicates_are_combined_every_one_must_hold() {
    // Given: Rows across two sectors, some at new highs
    let mut a = with_pe("A", "Technology", 20.0);
    a.recent_52_week_high = true;
    let mut b = with_pe("B", "Technology", 25.0);
    b.recent_52_week_high = false;
    let mut c = with_pe("C", "Energy", 22.0);
    c.recent_52_week_high = true;
    let rows = vec![a, b, c];

    // When: Sector, range and flag predicates are ANDed
    let request = FilterRequest::from_json_str(
        r#"{"Sector": "tech", "PE Ratio": [null, 30], "Recent 52-Week High": true}"#,
    )
    .expect("valid request");
    let kept = filter(&rows, &request);

    // Then: Only the row satisfying all three is kept
    let kept_symbols = kept.iter().map(|row| row.symbol.as_str()).collect::<Vec<_>>();
    assert_eq!(kept_symbols, vec!["A"]);
}

#[test]
fn when_filter_request_is_empty_rows_come_back_in_original_order() {
    // Given: Rows in an arbitrary order
    let rows = vec![
        with_pe("ZZ", "Energy", 1.0),
        with_pe("AA", "Energy", 2.0),
        with_pe("MM", "Energy", 3.0),
    ];

    // When: An empty request is applied
    let kept = filter(&rows, &FilterRequest::new());

    // Then: Nothing is dropped or reordered
    assert_eq!(kept, rows);
}

#[test]
fn when_screening_on_highlights_joined_rows_are_narrowed_to_cheap_peers() {
    // Given: A classified sector
    let records = vec![
        with_pe("AAA", "Technology", 10.0),
        with_pe("BBB", "Technology", 30.0),
        with_pe("CCC", "Technology", 32.0),
        with_pe("DDD", "Technology", 34.0),
    ];
    let classification = classify(&records);
    let rows = JoinedRow::join(records, classification.highlights);

    // When: Rows are filtered for below-baseline PE
    let request = FilterRequest::new().with("pe_ratio_highlight", FilterPredicate::text("below"));
    let kept = filter(&rows, &request);

    // Then: Only the cheap company remains
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].metrics.symbol.as_str(), "AAA");
}
