//! Sector-relative highlighting.
//!
//! Records are grouped by normalized sector. For each (sector, field) pair a
//! baseline is computed as the mean of the observations inside the Tukey
//! fences `[Q1 - 1.5 IQR, Q3 + 1.5 IQR]`. Each value is then labelled
//! against its baseline.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::category::normalize_optional;
use crate::{MetricField, MetricRecord, Symbol, ValidationError};

const UPPER_FACTOR: f64 = 1.35;
const LOWER_FACTOR: f64 = 0.65;
const FENCE: f64 = 1.5;

/// Position of a value relative to its sector baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Highlight {
    Above,
    #[default]
    Within,
    Below,
}

impl Highlight {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Above => "above",
            Self::Within => "within",
            Self::Below => "below",
        }
    }
}

impl Display for Highlight {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Highlight {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "above" => Ok(Self::Above),
            "within" => Ok(Self::Within),
            "below" => Ok(Self::Below),
            _ => Err(ValidationError::InvalidHighlight {
                value: value.to_owned(),
            }),
        }
    }
}

/// Highlight labels for one security, one per numeric field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightRecord {
    pub symbol: Symbol,
    pub sector: String,
    pub labels: BTreeMap<MetricField, Highlight>,
}

impl HighlightRecord {
    /// Every field `within`.
    pub fn neutral(symbol: Symbol, sector: impl Into<String>) -> Self {
        Self {
            symbol,
            sector: sector.into(),
            labels: MetricField::ALL
                .iter()
                .map(|field| (*field, Highlight::Within))
                .collect(),
        }
    }

    pub fn get(&self, field: MetricField) -> Highlight {
        self.labels.get(&field).copied().unwrap_or_default()
    }
}

/// Baseline for one (sector, field) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorBaseline {
    pub sector: String,
    pub field: MetricField,
    pub value: Option<f64>,
}

/// Classifier output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    /// One entry per classified record, sorted by symbol.
    pub highlights: Vec<HighlightRecord>,
    /// Keyed by (sector, field); only pairs with at least one observation.
    pub baselines: BTreeMap<(String, MetricField), Option<f64>>,
}

impl Classification {
    pub fn baseline(&self, sector: &str, field: MetricField) -> Option<f64> {
        self.baselines
            .get(&(sector.to_owned(), field))
            .copied()
            .flatten()
    }

    /// Baselines flattened into rows, sorted by sector then field.
    pub fn baseline_rows(&self) -> Vec<SectorBaseline> {
        self.baselines
            .iter()
            .map(|((sector, field), value)| SectorBaseline {
                sector: sector.clone(),
                field: *field,
                value: *value,
            })
            .collect()
    }
}

/// Quantile `q` of an ascending slice, interpolating linearly between the
/// closest ranks.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let position = q.clamp(0.0, 1.0) * last as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Mean of the values inside the Tukey fences. `None` for no values.
pub fn trimmed_baseline(values: &[f64]) -> Option<f64> {
    let mut sorted = values
        .iter()
        .copied()
        .filter(|value| value.is_finite())
        .collect::<Vec<_>>();
    sorted.sort_by(f64::total_cmp);

    let q1 = quantile(&sorted, 0.25)?;
    let q3 = quantile(&sorted, 0.75)?;
    let iqr = q3 - q1;
    let (low, high) = (q1 - FENCE * iqr, q3 + FENCE * iqr);

    let kept = sorted
        .iter()
        .copied()
        .filter(|value| (low..=high).contains(value))
        .collect::<Vec<_>>();
    if kept.is_empty() {
        return None;
    }
    Some(kept.iter().sum::<f64>() / kept.len() as f64)
}

/// Labels `value` against `baseline`. The thresholds are `baseline * 1.35`
/// and `baseline * 0.65`, whichever is larger acting as the upper bound.
pub fn label(value: Option<f64>, baseline: Option<f64>) -> Highlight {
    let (Some(value), Some(baseline)) = (value, baseline) else {
        return Highlight::Within;
    };
    let a = baseline * UPPER_FACTOR;
    let b = baseline * LOWER_FACTOR;
    let (upper, lower) = (a.max(b), a.min(b));

    if value > upper {
        Highlight::Above
    } else if value < lower {
        Highlight::Below
    } else {
        Highlight::Within
    }
}

/// Computes sector baselines and per-record highlight labels.
///
/// Records without a sector are left out of the result.
pub fn classify(records: &[MetricRecord]) -> Classification {
    let mut groups: BTreeMap<String, Vec<&MetricRecord>> = BTreeMap::new();
    for record in records {
        if let Some(sector) = normalize_optional(record.sector.as_deref()) {
            groups.entry(sector).or_default().push(record);
        }
    }

    let mut classification = Classification::default();
    for (sector, members) in &groups {
        for field in MetricField::ALL {
            let observations = members
                .iter()
                .filter_map(|record| record.get(field))
                .collect::<Vec<_>>();
            if observations.is_empty() {
                continue;
            }
            classification
                .baselines
                .insert((sector.clone(), field), trimmed_baseline(&observations));
        }

        for record in members {
            let labels = MetricField::ALL
                .iter()
                .map(|field| {
                    let baseline = classification.baseline(sector, *field);
                    (*field, label(record.get(*field), baseline))
                })
                .collect();
            classification.highlights.push(HighlightRecord {
                symbol: record.symbol.clone(),
                sector: sector.clone(),
                labels,
            });
        }
    }

    classification
        .highlights
        .sort_by(|a, b| a.symbol.cmp(&b.symbol));
    classification
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(raw: &str, sector: Option<&str>, pe: Option<f64>) -> MetricRecord {
        let mut record = MetricRecord::empty(Symbol::parse(raw).expect("valid symbol"));
        record.sector = sector.map(str::to_owned);
        record.set(MetricField::PeRatio, pe);
        record
    }

    #[test]
    fn quantile_interpolates_between_ranks() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&sorted, 0.25), Some(1.75));
        assert_eq!(quantile(&sorted, 0.75), Some(3.25));
        assert_eq!(quantile(&[7.0], 0.25), Some(7.0));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn trimmed_baseline_drops_outliers() {
        let values = [10.0, 11.0, 12.0, 13.0, 500.0];
        assert_eq!(trimmed_baseline(&values), Some(11.5));
        assert_eq!(trimmed_baseline(&[]), None);
    }

    #[test]
    fn labels_follow_the_thresholds() {
        assert_eq!(label(Some(14.0), Some(10.0)), Highlight::Above);
        assert_eq!(label(Some(13.5), Some(10.0)), Highlight::Within);
        assert_eq!(label(Some(6.0), Some(10.0)), Highlight::Below);
        assert_eq!(label(Some(6.5), Some(10.0)), Highlight::Within);
        assert_eq!(label(None, Some(10.0)), Highlight::Within);
        assert_eq!(label(Some(1.0), None), Highlight::Within);
    }

    #[test]
    fn negative_baseline_swaps_thresholds() {
        // baseline -10: upper -6.5, lower -13.5
        assert_eq!(label(Some(-5.0), Some(-10.0)), Highlight::Above);
        assert_eq!(label(Some(-14.0), Some(-10.0)), Highlight::Below);
        assert_eq!(label(Some(-10.0), Some(-10.0)), Highlight::Within);
    }

    #[test]
    fn records_without_sector_are_dropped() {
        let records = [
            record("A", Some("Technology"), Some(10.0)),
            record("B", None, Some(30.0)),
            record("C", Some("  "), Some(30.0)),
        ];

        let classification = classify(&records);

        assert_eq!(classification.highlights.len(), 1);
        assert_eq!(
            classification.baseline("Technology", MetricField::PeRatio),
            Some(10.0)
        );
    }

    #[test]
    fn sectors_are_grouped_after_normalization() {
        let records = [
            record("A", Some("Real Estate"), Some(10.0)),
            record("B", Some(" Real Estate "), Some(20.0)),
        ];

        let classification = classify(&records);

        assert_eq!(
            classification.baseline("Real Estate", MetricField::PeRatio),
            Some(15.0)
        );
        assert!(classification
            .highlights
            .iter()
            .all(|highlight| highlight.sector == "Real Estate"));
    }

    #[test]
    fn fields_without_observations_have_no_baseline_entry() {
        let classification = classify(&[record("A", Some("Energy"), None)]);

        assert!(!classification
            .baselines
            .contains_key(&(String::from("Energy"), MetricField::PeRatio)));
        assert_eq!(
            classification.highlights[0].get(MetricField::PeRatio),
            Highlight::Within
        );
    }
}
