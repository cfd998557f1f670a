use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Symbol, ValidationError};

/// Numeric screening columns, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricField {
    MarketCap,
    PeRatio,
    ForwardPe,
    PsRatio,
    PbRatio,
    DividendYield,
    CurrentRatio,
    DebtToEquity,
    #[serde(rename = "revenue_growth_4y")]
    RevenueGrowth4y,
    #[serde(rename = "eps_growth_4y")]
    EpsGrowth4y,
    ForwardEpsGrowth,
    Eps,
    PegRatio,
    Roe,
    Roa,
    Roic,
    ProfitMargin,
    GrossMargin,
    FcfYield,
    FcfEv,
    EvToEbitda,
}

impl MetricField {
    pub const ALL: [Self; 21] = [
        Self::MarketCap,
        Self::PeRatio,
        Self::ForwardPe,
        Self::PsRatio,
        Self::PbRatio,
        Self::DividendYield,
        Self::CurrentRatio,
        Self::DebtToEquity,
        Self::RevenueGrowth4y,
        Self::EpsGrowth4y,
        Self::ForwardEpsGrowth,
        Self::Eps,
        Self::PegRatio,
        Self::Roe,
        Self::Roa,
        Self::Roic,
        Self::ProfitMargin,
        Self::GrossMargin,
        Self::FcfYield,
        Self::FcfEv,
        Self::EvToEbitda,
    ];

    /// Storage and filter key.
    pub const fn column(self) -> &'static str {
        match self {
            Self::MarketCap => "market_cap",
            Self::PeRatio => "pe_ratio",
            Self::ForwardPe => "forward_pe",
            Self::PsRatio => "ps_ratio",
            Self::PbRatio => "pb_ratio",
            Self::DividendYield => "dividend_yield",
            Self::CurrentRatio => "current_ratio",
            Self::DebtToEquity => "debt_to_equity",
            Self::RevenueGrowth4y => "revenue_growth_4y",
            Self::EpsGrowth4y => "eps_growth_4y",
            Self::ForwardEpsGrowth => "forward_eps_growth",
            Self::Eps => "eps",
            Self::PegRatio => "peg_ratio",
            Self::Roe => "roe",
            Self::Roa => "roa",
            Self::Roic => "roic",
            Self::ProfitMargin => "profit_margin",
            Self::GrossMargin => "gross_margin",
            Self::FcfYield => "fcf_yield",
            Self::FcfEv => "fcf_ev",
            Self::EvToEbitda => "ev_to_ebitda",
        }
    }

    /// Human-readable column header.
    pub const fn label(self) -> &'static str {
        match self {
            Self::MarketCap => "Market Cap",
            Self::PeRatio => "PE Ratio",
            Self::ForwardPe => "Forward P/E",
            Self::PsRatio => "P/S Ratio",
            Self::PbRatio => "P/B Ratio",
            Self::DividendYield => "Dividend Yield (%)",
            Self::CurrentRatio => "Current Ratio",
            Self::DebtToEquity => "Debt/Equity",
            Self::RevenueGrowth4y => "Revenue Growth 4Y (%)",
            Self::EpsGrowth4y => "EPS Growth 4Y (%)",
            Self::ForwardEpsGrowth => "Forward EPS Growth (%)",
            Self::Eps => "EPS",
            Self::PegRatio => "PEG Ratio",
            Self::Roe => "ROE (%)",
            Self::Roa => "ROA (%)",
            Self::Roic => "ROIC (%)",
            Self::ProfitMargin => "Profit Margin (%)",
            Self::GrossMargin => "Gross Margin (%)",
            Self::FcfYield => "FCF Yield (%)",
            Self::FcfEv => "FCF/EV",
            Self::EvToEbitda => "EV/EBITDA",
        }
    }

    /// Highlight column paired with this metric on joined rows.
    pub fn highlight_column(self) -> String {
        format!("{}_highlight", self.column())
    }
}

impl Display for MetricField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for MetricField {
    type Err = ValidationError;

    /// Accepts either the column key or the display label.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|field| {
                field.column().eq_ignore_ascii_case(trimmed)
                    || field.label().eq_ignore_ascii_case(trimmed)
            })
            .ok_or_else(|| ValidationError::UnknownField {
                value: trimmed.to_owned(),
            })
    }
}

/// One screened security. `None` means the value was not available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub symbol: Symbol,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub forward_pe: Option<f64>,
    pub ps_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub current_ratio: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub revenue_growth_4y: Option<f64>,
    pub eps_growth_4y: Option<f64>,
    pub forward_eps_growth: Option<f64>,
    pub eps: Option<f64>,
    pub peg_ratio: Option<f64>,
    pub roe: Option<f64>,
    pub roa: Option<f64>,
    pub roic: Option<f64>,
    pub profit_margin: Option<f64>,
    pub gross_margin: Option<f64>,
    pub fcf_yield: Option<f64>,
    pub fcf_ev: Option<f64>,
    pub ev_to_ebitda: Option<f64>,
    pub recent_52_week_high: bool,
}

impl MetricRecord {
    /// A record with every metric unavailable.
    pub fn empty(symbol: Symbol) -> Self {
        Self {
            symbol,
            sector: None,
            industry: None,
            market_cap: None,
            pe_ratio: None,
            forward_pe: None,
            ps_ratio: None,
            pb_ratio: None,
            dividend_yield: None,
            current_ratio: None,
            debt_to_equity: None,
            revenue_growth_4y: None,
            eps_growth_4y: None,
            forward_eps_growth: None,
            eps: None,
            peg_ratio: None,
            roe: None,
            roa: None,
            roic: None,
            profit_margin: None,
            gross_margin: None,
            fcf_yield: None,
            fcf_ev: None,
            ev_to_ebitda: None,
            recent_52_week_high: false,
        }
    }

    pub fn get(&self, field: MetricField) -> Option<f64> {
        match field {
            MetricField::MarketCap => self.market_cap,
            MetricField::PeRatio => self.pe_ratio,
            MetricField::ForwardPe => self.forward_pe,
            MetricField::PsRatio => self.ps_ratio,
            MetricField::PbRatio => self.pb_ratio,
            MetricField::DividendYield => self.dividend_yield,
            MetricField::CurrentRatio => self.current_ratio,
            MetricField::DebtToEquity => self.debt_to_equity,
            MetricField::RevenueGrowth4y => self.revenue_growth_4y,
            MetricField::EpsGrowth4y => self.eps_growth_4y,
            MetricField::ForwardEpsGrowth => self.forward_eps_growth,
            MetricField::Eps => self.eps,
            MetricField::PegRatio => self.peg_ratio,
            MetricField::Roe => self.roe,
            MetricField::Roa => self.roa,
            MetricField::Roic => self.roic,
            MetricField::ProfitMargin => self.profit_margin,
            MetricField::GrossMargin => self.gross_margin,
            MetricField::FcfYield => self.fcf_yield,
            MetricField::FcfEv => self.fcf_ev,
            MetricField::EvToEbitda => self.ev_to_ebitda,
        }
    }

    /// Stores a value, dropping non-finite input.
    pub fn set(&mut self, field: MetricField, value: Option<f64>) {
        let value = value.filter(|v| v.is_finite());
        let slot = match field {
            MetricField::MarketCap => &mut self.market_cap,
            MetricField::PeRatio => &mut self.pe_ratio,
            MetricField::ForwardPe => &mut self.forward_pe,
            MetricField::PsRatio => &mut self.ps_ratio,
            MetricField::PbRatio => &mut self.pb_ratio,
            MetricField::DividendYield => &mut self.dividend_yield,
            MetricField::CurrentRatio => &mut self.current_ratio,
            MetricField::DebtToEquity => &mut self.debt_to_equity,
            MetricField::RevenueGrowth4y => &mut self.revenue_growth_4y,
            MetricField::EpsGrowth4y => &mut self.eps_growth_4y,
            MetricField::ForwardEpsGrowth => &mut self.forward_eps_growth,
            MetricField::Eps => &mut self.eps,
            MetricField::PegRatio => &mut self.peg_ratio,
            MetricField::Roe => &mut self.roe,
            MetricField::Roa => &mut self.roa,
            MetricField::Roic => &mut self.roic,
            MetricField::ProfitMargin => &mut self.profit_margin,
            MetricField::GrossMargin => &mut self.gross_margin,
            MetricField::FcfYield => &mut self.fcf_yield,
            MetricField::FcfEv => &mut self.fcf_ev,
            MetricField::EvToEbitda => &mut self.ev_to_ebitda,
        };
        *slot = value;
    }

    /// Builder-style variant of [`MetricRecord::set`].
    pub fn with(mut self, field: MetricField, value: f64) -> Self {
        self.set(field, Some(value));
        self
    }

    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_are_unique() {
        let mut columns = MetricField::ALL.map(MetricField::column).to_vec();
        columns.sort_unstable();
        columns.dedup();
        assert_eq!(columns.len(), MetricField::ALL.len());
    }

    #[test]
    fn parses_column_and_label() {
        assert_eq!("pe_ratio".parse::<MetricField>(), Ok(MetricField::PeRatio));
        assert_eq!("FCF/EV".parse::<MetricField>(), Ok(MetricField::FcfEv));
        assert!("volume".parse::<MetricField>().is_err());
    }

    #[test]
    fn serde_name_matches_column() {
        for field in MetricField::ALL {
            let encoded = serde_json::to_string(&field).expect("serializes");
            assert_eq!(encoded, format!("\"{}\"", field.column()));
        }
    }

    #[test]
    fn set_and_get_cover_every_field() {
        let symbol = Symbol::parse("AAPL").expect("valid");
        let mut record = MetricRecord::empty(symbol);
        for (index, field) in MetricField::ALL.into_iter().enumerate() {
            record.set(field, Some(index as f64));
        }
        for (index, field) in MetricField::ALL.into_iter().enumerate() {
            assert_eq!(record.get(field), Some(index as f64));
        }
    }

    #[test]
    fn set_discards_non_finite_values() {
        let symbol = Symbol::parse("AAPL").expect("valid");
        let mut record = MetricRecord::empty(symbol);
        record.set(MetricField::PeRatio, Some(f64::INFINITY));
        assert_eq!(record.pe_ratio, None);
    }
}
