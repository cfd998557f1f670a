//! Query/filter engine over screen rows.
//!
//! A [`FilterRequest`] maps field names to predicates that are ANDed
//! together. Field names accept either the column name (`pe_ratio`) or the
//! display label (`PE Ratio`). Unknown fields and predicates whose shape
//! does not fit the field are ignored.
//!
//! | Predicate | JSON | Field kind |
//! |-----------|------|------------|
//! | [`FilterPredicate::Range`] | `[min, max]`, either end `null` | numeric |
//! | [`FilterPredicate::Bool`] | `true` / `false` | boolean |
//! | [`FilterPredicate::Text`] | `"text"` | sector, industry, symbol, highlight |

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::classify::HighlightRecord;
use crate::{CoreError, MetricField, MetricRecord, ValidationError};

/// One constraint on one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FilterPredicate {
    /// Inclusive range; an absent bound is open.
    Range { min: Option<f64>, max: Option<f64> },
    Bool { value: bool },
    /// Case-insensitive substring.
    Text { value: String },
}

impl FilterPredicate {
    pub fn range(min: Option<f64>, max: Option<f64>) -> Self {
        Self::Range { min, max }
    }

    pub fn between(min: f64, max: f64) -> Self {
        Self::range(Some(min), Some(max))
    }

    pub fn boolean(value: bool) -> Self {
        Self::Bool { value }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }

    fn kind(&self) -> FieldKind {
        match self {
            Self::Range { .. } => FieldKind::Number,
            Self::Bool { .. } => FieldKind::Bool,
            Self::Text { .. } => FieldKind::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Number,
    Bool,
    Text,
}

/// A filterable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKey {
    Metric(MetricField),
    Sector,
    Industry,
    Symbol,
    RecentHigh,
    /// Highlight label of a metric; only present on joined rows.
    Highlight(MetricField),
}

impl FilterKey {
    fn kind(self) -> FieldKind {
        match self {
            Self::Metric(_) => FieldKind::Number,
            Self::RecentHigh => FieldKind::Bool,
            Self::Sector | Self::Industry | Self::Symbol | Self::Highlight(_) => FieldKind::Text,
        }
    }
}

impl FromStr for FilterKey {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "sector" => return Ok(Self::Sector),
            "industry" => return Ok(Self::Industry),
            "symbol" | "ticker" => return Ok(Self::Symbol),
            "recent_52_week_high" | "recent 52-week high" => return Ok(Self::RecentHigh),
            _ => {}
        }
        if let Some(column) = trimmed.strip_suffix("_highlight") {
            return column.parse().map(Self::Highlight);
        }
        trimmed.parse().map(Self::Metric)
    }
}

/// Field value as seen by the filter engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Number(Option<f64>),
    Bool(bool),
    Text(Option<&'a str>),
}

/// Rows the engine can filter.
pub trait ScreenRow {
    /// Value of `key`, or `None` when the row type has no such field.
    fn field(&self, key: FilterKey) -> Option<FieldValue<'_>>;
}

impl ScreenRow for MetricRecord {
    fn field(&self, key: FilterKey) -> Option<FieldValue<'_>> {
        match key {
            FilterKey::Metric(field) => Some(FieldValue::Number(self.get(field))),
            FilterKey::Sector => Some(FieldValue::Text(self.sector.as_deref())),
            FilterKey::Industry => Some(FieldValue::Text(self.industry.as_deref())),
            FilterKey::Symbol => Some(FieldValue::Text(Some(self.symbol.as_str()))),
            FilterKey::RecentHigh => Some(FieldValue::Bool(self.recent_52_week_high)),
            FilterKey::Highlight(_) => None,
        }
    }
}

/// Metrics joined with their highlight labels by symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRow {
    #[serde(flatten)]
    pub metrics: MetricRecord,
    pub highlights: Option<HighlightRecord>,
}

impl JoinedRow {
    /// Pairs each record with the highlight entry sharing its symbol.
    pub fn join(metrics: Vec<MetricRecord>, highlights: Vec<HighlightRecord>) -> Vec<Self> {
        let mut by_symbol = highlights
            .into_iter()
            .map(|highlight| (highlight.symbol.clone(), highlight))
            .collect::<BTreeMap<_, _>>();
        metrics
            .into_iter()
            .map(|metrics| {
                let highlights = by_symbol.remove(&metrics.symbol);
                Self {
                    metrics,
                    highlights,
                }
            })
            .collect()
    }
}

impl ScreenRow for JoinedRow {
    fn field(&self, key: FilterKey) -> Option<FieldValue<'_>> {
        match key {
            FilterKey::Highlight(field) => Some(FieldValue::Text(
                self.highlights
                    .as_ref()
                    .map(|highlights| highlights.get(field).as_str()),
            )),
            other => self.metrics.field(other),
        }
    }
}

/// Field name to predicate, ANDed together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterRequest {
    predicates: BTreeMap<String, FilterPredicate>,
}

impl FilterRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, predicate: FilterPredicate) -> Self {
        self.predicates.insert(field.into(), predicate);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn predicates(&self) -> impl Iterator<Item = (&str, &FilterPredicate)> {
        self.predicates
            .iter()
            .map(|(field, predicate)| (field.as_str(), predicate))
    }

    /// Decodes `{ "<field>": [min, max] | bool | "text" | null, ... }`.
    ///
    /// `null` and `[null, null]` impose no constraint. Bounds may be numbers
    /// or shorthand strings such as `"1.5B"`. Entries of any other shape are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Fails when the document is not JSON or not an object.
    pub fn from_json_str(input: &str) -> Result<Self, CoreError> {
        let value: Value = serde_json::from_str(input)?;
        Self::from_json(&value)
    }

    pub fn from_json(value: &Value) -> Result<Self, CoreError> {
        let Value::Object(entries) = value else {
            return Err(CoreError::InvalidFilterRequest(String::from(
                "expected a JSON object of field predicates",
            )));
        };

        let mut request = Self::new();
        for (field, raw) in entries {
            match decode_predicate(raw) {
                Ok(Some(predicate)) => request = request.with(field.clone(), predicate),
                Ok(None) => {}
                Err(reason) => debug!(field = %field, "ignoring filter entry: {reason}"),
            }
        }
        Ok(request)
    }

    /// Keeps predicates whose field is known and whose shape fits it.
    fn resolve(&self) -> Vec<(FilterKey, &FilterPredicate)> {
        self.predicates
            .iter()
            .filter_map(|(field, predicate)| {
                let Ok(key) = field.parse::<FilterKey>() else {
                    debug!(field = %field, "ignoring predicate on unknown field");
                    return None;
                };
                if key.kind() != predicate.kind() {
                    debug!(field = %field, "ignoring predicate of the wrong shape");
                    return None;
                }
                Some((key, predicate))
            })
            .collect()
    }
}

fn decode_predicate(raw: &Value) -> Result<Option<FilterPredicate>, String> {
    match raw {
        Value::Null => Ok(None),
        Value::Bool(value) => Ok(Some(FilterPredicate::boolean(*value))),
        Value::String(value) => Ok(Some(FilterPredicate::text(value.clone()))),
        Value::Array(bounds) if bounds.len() == 2 => {
            let min = decode_bound(&bounds[0])?;
            let max = decode_bound(&bounds[1])?;
            Ok((min.is_some() || max.is_some()).then(|| FilterPredicate::range(min, max)))
        }
        other => Err(format!("unsupported predicate shape: {other}")),
    }
}

fn decode_bound(raw: &Value) -> Result<Option<f64>, String> {
    match raw {
        Value::Null => Ok(None),
        Value::Number(number) => number
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("bound {number} is not representable")),
        Value::String(text) if text.trim().is_empty() => Ok(None),
        Value::String(text) => parse_bound(text).map(Some).map_err(|e| e.to_string()),
        other => Err(format!("unsupported bound: {other}")),
    }
}

/// Parses a numeric bound with optional thousands separators, a leading
/// `$`, and a `K`/`M`/`B`/`T` magnitude suffix.
pub fn parse_bound(input: &str) -> Result<f64, ValidationError> {
    let invalid = || ValidationError::InvalidBound {
        value: input.to_owned(),
    };
    let cleaned = input
        .trim()
        .trim_start_matches('$')
        .replace([',', '_', ' '], "");

    let (digits, scale) = match cleaned.chars().last().map(|c| c.to_ascii_uppercase()) {
        Some('K') => (&cleaned[..cleaned.len() - 1], 1e3),
        Some('M') => (&cleaned[..cleaned.len() - 1], 1e6),
        Some('B') => (&cleaned[..cleaned.len() - 1], 1e9),
        Some('T') => (&cleaned[..cleaned.len() - 1], 1e12),
        _ => (cleaned.as_str(), 1.0),
    };

    let value = digits.parse::<f64>().map_err(|_| invalid())? * scale;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(invalid())
    }
}

fn satisfies(value: FieldValue<'_>, predicate: &FilterPredicate) -> bool {
    match (value, predicate) {
        (FieldValue::Number(_), FilterPredicate::Range { min: None, max: None }) => true,
        (FieldValue::Number(value), FilterPredicate::Range { min, max }) => {
            value.is_some_and(|value| {
                min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
            })
        }
        (FieldValue::Bool(value), FilterPredicate::Bool { value: wanted }) => value == *wanted,
        (FieldValue::Text(value), FilterPredicate::Text { value: needle }) => value
            .is_some_and(|value| value.to_lowercase().contains(&needle.to_lowercase())),
        _ => true,
    }
}

/// Rows satisfying every applicable predicate, in their original order.
pub fn filter<R>(rows: &[R], request: &FilterRequest) -> Vec<R>
where
    R: ScreenRow + Clone,
{
    let predicates = request.resolve();
    rows.iter()
        .filter(|row| {
            predicates.iter().all(|(key, predicate)| {
                row.field(*key)
                    .map_or(true, |value| satisfies(value, predicate))
            })
        })
        .cloned()
        .collect()
}
