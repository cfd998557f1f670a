use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::Date;

/// Provider key/value profile for one security (`marketCap`, `sector`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanySnapshot {
    values: BTreeMap<String, Value>,
}

impl CompanySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Numeric coercion; text that parses as a float is accepted.
    pub fn number(&self, key: &str) -> Option<f64> {
        let value = match self.values.get(key)? {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        }?;
        value.is_finite().then_some(value)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key)? {
            Value::String(text) if !text.trim().is_empty() => Some(text.as_str()),
            _ => None,
        }
    }
}

/// Financial statement a line item is published in. Each statement has its
/// own reporting dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    Income,
    BalanceSheet,
    CashFlow,
}

/// Statement line items the derivations read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItem {
    OperatingCashFlow,
    CapitalExpenditure,
    NetIncome,
    StockholdersEquity,
    LongTermDebt,
    CurrentDebt,
    LongTermCapitalLeaseObligation,
    CurrentCapitalLeaseObligation,
    TotalAssets,
    TotalRevenue,
    BasicEps,
}

impl LineItem {
    pub const ALL: [Self; 11] = [
        Self::OperatingCashFlow,
        Self::CapitalExpenditure,
        Self::NetIncome,
        Self::StockholdersEquity,
        Self::LongTermDebt,
        Self::CurrentDebt,
        Self::LongTermCapitalLeaseObligation,
        Self::CurrentCapitalLeaseObligation,
        Self::TotalAssets,
        Self::TotalRevenue,
        Self::BasicEps,
    ];

    /// Invested-capital components summed for ROIC.
    pub const INVESTED_CAPITAL: [Self; 5] = [
        Self::StockholdersEquity,
        Self::LongTermDebt,
        Self::CurrentDebt,
        Self::LongTermCapitalLeaseObligation,
        Self::CurrentCapitalLeaseObligation,
    ];

    /// Series name used by the fundamentals timeseries API, without the
    /// `quarterly`/`annual` prefix.
    pub const fn series_name(self) -> &'static str {
        match self {
            Self::OperatingCashFlow => "OperatingCashFlow",
            Self::CapitalExpenditure => "CapitalExpenditure",
            Self::NetIncome => "NetIncome",
            Self::StockholdersEquity => "StockholdersEquity",
            Self::LongTermDebt => "LongTermDebt",
            Self::CurrentDebt => "CurrentDebt",
            Self::LongTermCapitalLeaseObligation => "LongTermCapitalLeaseObligation",
            Self::CurrentCapitalLeaseObligation => "CurrentCapitalLeaseObligation",
            Self::TotalAssets => "TotalAssets",
            Self::TotalRevenue => "TotalRevenue",
            Self::BasicEps => "BasicEPS",
        }
    }

    pub const fn statement(self) -> Statement {
        match self {
            Self::OperatingCashFlow | Self::CapitalExpenditure => Statement::CashFlow,
            Self::NetIncome | Self::TotalRevenue | Self::BasicEps => Statement::Income,
            Self::StockholdersEquity
            | Self::LongTermDebt
            | Self::CurrentDebt
            | Self::LongTermCapitalLeaseObligation
            | Self::CurrentCapitalLeaseObligation
            | Self::TotalAssets => Statement::BalanceSheet,
        }
    }

    pub fn from_series_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|item| item.series_name() == name)
    }
}

impl Display for LineItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.series_name())
    }
}

/// Reporting cadence of a statement table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Quarterly,
    Annual,
}

impl Frequency {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quarterly => "quarterly",
            Self::Annual => "annual",
        }
    }
}

impl Display for Frequency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reporting period column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementPeriod {
    pub as_of: Date,
    pub values: BTreeMap<LineItem, f64>,
}

impl StatementPeriod {
    pub fn new(as_of: Date) -> Self {
        Self {
            as_of,
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, item: LineItem, value: f64) -> Self {
        if value.is_finite() {
            self.values.insert(item, value);
        }
        self
    }

    pub fn get(&self, item: LineItem) -> Option<f64> {
        self.values.get(&item).copied()
    }

    /// Whether any line item of `statement` is reported for this period.
    pub fn reports(&self, statement: Statement) -> bool {
        self.values.keys().any(|item| item.statement() == statement)
    }
}

/// Statement periods ordered most recent first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementTable {
    pub frequency: Frequency,
    periods: Vec<StatementPeriod>,
}

impl StatementTable {
    pub fn new(frequency: Frequency, mut periods: Vec<StatementPeriod>) -> Self {
        periods.sort_by(|a, b| b.as_of.cmp(&a.as_of));
        Self { frequency, periods }
    }

    pub fn empty(frequency: Frequency) -> Self {
        Self::new(frequency, Vec::new())
    }

    pub fn periods(&self) -> &[StatementPeriod] {
        &self.periods
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Periods in which `statement` was published, most recent first.
    pub fn statement_periods(
        &self,
        statement: Statement,
    ) -> impl Iterator<Item = &StatementPeriod> + '_ {
        self.periods
            .iter()
            .filter(move |period| period.reports(statement))
    }

    /// Values for the `count` most recent periods of the item's statement,
    /// gaps kept as `None`.
    pub fn recent(&self, item: LineItem, count: usize) -> Vec<Option<f64>> {
        self.statement_periods(item.statement())
            .take(count)
            .map(|period| period.get(item))
            .collect()
    }

    /// Reported values only, most recent first.
    pub fn reported(&self, item: LineItem) -> Vec<f64> {
        self.periods
            .iter()
            .filter_map(|period| period.get(item))
            .collect()
    }

    /// Value `offset` periods of the item's statement back from the latest,
    /// when reported.
    pub fn at(&self, item: LineItem, offset: usize) -> Option<f64> {
        self.statement_periods(item.statement())
            .nth(offset)
            .and_then(|period| period.get(item))
    }
}

/// Daily session highs, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub highs: Vec<f64>,
}

impl PriceHistory {
    pub fn new(highs: Vec<f64>) -> Self {
        Self {
            highs: highs.into_iter().filter(|v| v.is_finite()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.highs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Month;

    fn date(year: i32, month: Month) -> Date {
        Date::from_calendar_date(year, month, 28).expect("valid date")
    }

    #[test]
    fn snapshot_coerces_numbers_and_numeric_text() {
        let snapshot = CompanySnapshot::new()
            .with("marketCap", 1_000_000)
            .with("trailingPE", "21.5")
            .with("forwardPE", "Infinity")
            .with("sector", "Technology");

        assert_eq!(snapshot.number("marketCap"), Some(1_000_000.0));
        assert_eq!(snapshot.number("trailingPE"), Some(21.5));
        assert_eq!(snapshot.number("forwardPE"), None);
        assert_eq!(snapshot.number("sector"), None);
        assert_eq!(snapshot.text("sector"), Some("Technology"));
        assert_eq!(snapshot.text("industry"), None);
    }

    #[test]
    fn table_orders_periods_most_recent_first() {
        let table = StatementTable::new(
            Frequency::Annual,
            vec![
                StatementPeriod::new(date(2021, Month::December)).with(LineItem::TotalRevenue, 1.0),
                StatementPeriod::new(date(2023, Month::December)).with(LineItem::TotalRevenue, 3.0),
                StatementPeriod::new(date(2022, Month::December)).with(LineItem::BasicEps, 2.0),
            ],
        );

        assert_eq!(
            table.recent(LineItem::TotalRevenue, 3),
            vec![Some(3.0), None, Some(1.0)]
        );
        assert_eq!(table.reported(LineItem::TotalRevenue), vec![3.0, 1.0]);
        assert_eq!(table.at(LineItem::TotalRevenue, 2), Some(1.0));
        assert_eq!(table.at(LineItem::TotalRevenue, 5), None);
    }

    #[test]
    fn statements_keep_their_own_reporting_dates() {
        let table = StatementTable::new(
            Frequency::Quarterly,
            vec![
                StatementPeriod::new(date(2024, Month::December)).with(LineItem::TotalAssets, 9.0),
                StatementPeriod::new(date(2024, Month::September))
                    .with(LineItem::NetIncome, 2.0)
                    .with(LineItem::TotalAssets, 8.0),
                StatementPeriod::new(date(2024, Month::June)).with(LineItem::NetIncome, 1.0),
            ],
        );

        assert_eq!(table.recent(LineItem::NetIncome, 2), vec![Some(2.0), Some(1.0)]);
        assert_eq!(table.at(LineItem::TotalAssets, 1), Some(8.0));
        assert_eq!(table.statement_periods(Statement::CashFlow).count(), 0);
        assert_eq!(LineItem::CapitalExpenditure.statement(), Statement::CashFlow);
    }

    #[test]
    fn series_names_round_trip() {
        for item in LineItem::ALL {
            assert_eq!(LineItem::from_series_name(item.series_name()), Some(item));
        }
    }
}
