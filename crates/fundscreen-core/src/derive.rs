//! Ratios the provider does not report directly.
//!
//! Every function here is pure and total: missing line items, short
//! histories, zero denominators and non-finite results all come back as
//! `None` rather than an error.
//!
//! Quarterly figures are read per statement: a TTM window is the four most
//! recent periods in which that line item's statement was published, so a
//! balance sheet dated later than the cash-flow statement does not shift it.
//!
//! | Function | Inputs |
//! |----------|--------|
//! | [`fcf_ttm`] | quarterly operating cash flow and capex |
//! | [`fcf_yield`] / [`fcf_to_ev`] | FCF (TTM) and market cap / enterprise value |
//! | [`growth_4y`] | annual revenue or basic EPS |
//! | [`roic_ttm`] | quarterly net income and invested capital |
//! | [`roaa_ttm`] | quarterly net income and total assets |
//! | [`recent_52_week_high`] | daily highs |

use crate::domain::{LineItem, PriceHistory, Statement, StatementTable};

const TTM_QUARTERS: usize = 4;
const GROWTH_YEARS: usize = 4;

/// Sector label shared by banks and insurers.
pub const FINANCIAL_SERVICES: &str = "Financial Services";

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn ratio_percent(numerator: f64, denominator: Option<f64>) -> Option<f64> {
    let denominator = denominator.filter(|d| *d != 0.0)?;
    finite(numerator / denominator * 100.0)
}

/// Sum of the four most recent quarters of the item's statement; every one
/// of them must report the item.
fn ttm_sum(quarterly: &StatementTable, item: LineItem) -> Option<f64> {
    let values = quarterly.recent(item, TTM_QUARTERS);
    if values.len() < TTM_QUARTERS {
        return None;
    }
    values.into_iter().sum::<Option<f64>>().and_then(finite)
}

/// Free cash flow over the trailing four quarters (capex is reported negative).
pub fn fcf_ttm(quarterly: &StatementTable) -> Option<f64> {
    let operating = ttm_sum(quarterly, LineItem::OperatingCashFlow)?;
    let capex = ttm_sum(quarterly, LineItem::CapitalExpenditure)?;
    finite(operating + capex)
}

pub fn fcf_yield(fcf: Option<f64>, market_cap: Option<f64>) -> Option<f64> {
    ratio_percent(fcf?, market_cap)
}

pub fn fcf_to_ev(fcf: Option<f64>, enterprise_value: Option<f64>) -> Option<f64> {
    ratio_percent(fcf?, enterprise_value)
}

/// Four-year compound growth between two endpoint values, in percent.
///
/// Both endpoints must share a strict sign. When both are negative the
/// CAGR of the magnitudes is negated, so a shrinking loss reads as positive
/// growth.
pub fn cagr_4y(latest: f64, earliest: f64) -> Option<f64> {
    let exponent = 1.0 / GROWTH_YEARS as f64;
    let cagr = ((latest / earliest).powf(exponent) - 1.0) * 100.0;
    if latest > 0.0 && earliest > 0.0 {
        finite(cagr)
    } else if latest < 0.0 && earliest < 0.0 {
        finite(-cagr)
    } else {
        None
    }
}

/// Growth over the four most recent reported annual values of `item`.
pub fn growth_4y(annual: &StatementTable, item: LineItem) -> Option<f64> {
    let reported = annual.reported(item);
    if reported.len() < GROWTH_YEARS {
        return None;
    }
    cagr_4y(reported[0], reported[GROWTH_YEARS - 1])
}

pub fn net_income_ttm(quarterly: &StatementTable) -> Option<f64> {
    ttm_sum(quarterly, LineItem::NetIncome)
}

/// Average invested capital over up to four balance-sheet quarters.
/// Unreported components count as zero for their quarter.
pub fn average_invested_capital(quarterly: &StatementTable) -> Option<f64> {
    let quarters = quarterly
        .statement_periods(Statement::BalanceSheet)
        .take(TTM_QUARTERS)
        .map(|period| {
            LineItem::INVESTED_CAPITAL
                .iter()
                .map(|item| period.get(*item).unwrap_or(0.0))
                .sum::<f64>()
        })
        .collect::<Vec<_>>();

    if quarters.is_empty() {
        return None;
    }
    finite(quarters.iter().sum::<f64>() / quarters.len() as f64)
}

/// Return on invested capital (TTM), in percent.
pub fn roic_ttm(quarterly: &StatementTable) -> Option<f64> {
    let net_income = net_income_ttm(quarterly)?;
    ratio_percent(net_income, average_invested_capital(quarterly))
}

/// Return on average assets (TTM), in percent. Needs total assets at the
/// latest balance sheet and the one four quarters earlier.
pub fn roaa_ttm(quarterly: &StatementTable) -> Option<f64> {
    let net_income = net_income_ttm(quarterly)?;
    let latest = quarterly.at(LineItem::TotalAssets, 0)?;
    let year_ago = quarterly.at(LineItem::TotalAssets, TTM_QUARTERS)?;
    ratio_percent(net_income, Some((latest + year_ago) / 2.0))
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn max_high(highs: &[f64]) -> Option<f64> {
    highs.iter().copied().reduce(f64::max).map(round_cents)
}

/// Whether the highest high of the last `recent_sessions` sessions matches
/// the highest high of the trailing `history_sessions`, compared in cents.
pub fn recent_52_week_high(
    history: &PriceHistory,
    recent_sessions: usize,
    history_sessions: usize,
) -> bool {
    let highs = history.highs.as_slice();
    let window = &highs[highs.len().saturating_sub(history_sessions)..];
    let recent = &window[window.len().saturating_sub(recent_sessions)..];

    match (max_high(recent), max_high(window)) {
        (Some(recent), Some(trailing)) => recent >= trailing,
        _ => false,
    }
}

/// Banks and insurers, whose balance sheets make several ratios meaningless.
pub fn is_financial_institution(sector: Option<&str>, industry: Option<&str>) -> bool {
    let industry = industry.unwrap_or_default();
    sector == Some(FINANCIAL_SERVICES)
        && (industry.contains("Bank") || industry.contains("Insurance"))
}

/// Drops negative multiples (forward P/E, PEG, EV/EBITDA).
pub fn non_negative(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v >= 0.0)
}

/// Fraction to percent. The provider reports zero for unreported fractions,
/// so zero is treated as unavailable.
pub fn fraction_percent(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0).and_then(|v| finite(v * 100.0))
}

/// Provider debt/equity arrives as a percentage.
pub fn debt_to_equity(value: Option<f64>) -> Option<f64> {
    value.and_then(|v| finite(v / 100.0))
}
