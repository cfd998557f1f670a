//! One security in, one [`MetricRecord`] out.

use tracing::debug;

use crate::category::normalize_optional;
use crate::config::PipelineConfig;
use crate::data_source::{DataSource, SourceError, SourceErrorKind};
use crate::derive;
use crate::{
    CompanySnapshot, Frequency, LineItem, MetricField, MetricRecord, PriceHistory,
    StatementTable, Symbol,
};

/// Provider payloads gathered for one security. Each piece may be missing.
#[derive(Debug, Clone, Default)]
pub struct ProviderData {
    pub snapshot: Option<CompanySnapshot>,
    pub annual: Option<StatementTable>,
    pub quarterly: Option<StatementTable>,
    pub history: Option<PriceHistory>,
}

/// Fetches everything needed for `symbol` and derives its record.
///
/// # Errors
///
/// Fails when the snapshot call reports the symbol as unknown, or when every
/// call failed. Any other partial failure, including statements or history
/// the provider has no data for, only blanks the dependent fields.
pub async fn assemble_record(
    source: &dyn DataSource,
    symbol: &Symbol,
    config: &PipelineConfig,
) -> Result<MetricRecord, SourceError> {
    let (snapshot, annual, quarterly, history) = tokio::join!(
        source.snapshot(symbol),
        source.statements(symbol, Frequency::Annual),
        source.statements(symbol, Frequency::Quarterly),
        source.price_history(symbol),
    );

    let failures = [
        ("snapshot", snapshot.as_ref().err()),
        ("annual statements", annual.as_ref().err()),
        ("quarterly statements", quarterly.as_ref().err()),
        ("price history", history.as_ref().err()),
    ];

    // The snapshot names the company; without it the symbol is unknown.
    if let Err(error) = &snapshot {
        if error.kind() == SourceErrorKind::NotFound {
            return Err(error.clone());
        }
    }

    if failures.iter().all(|(_, error)| error.is_some()) {
        let last = failures
            .iter()
            .rev()
            .find_map(|(_, error)| *error)
            .cloned()
            .unwrap_or_else(|| SourceError::unavailable("every provider call failed"));
        return Err(last);
    }

    for (call, error) in failures {
        if let Some(error) = error {
            debug!(
                symbol = %symbol,
                call,
                code = error.code(),
                "partial provider failure: {}",
                error.message()
            );
        }
    }

    let data = ProviderData {
        snapshot: snapshot.ok(),
        annual: annual.ok(),
        quarterly: quarterly.ok(),
        history: history.ok(),
    };
    Ok(derive_record(symbol.clone(), &data, config))
}

/// Applies every derivation rule to already-fetched provider data.
pub fn derive_record(
    symbol: Symbol,
    data: &ProviderData,
    config: &PipelineConfig,
) -> MetricRecord {
    let empty = CompanySnapshot::new();
    let snapshot = data.snapshot.as_ref().unwrap_or(&empty);
    let number = |key: &str| snapshot.number(key);

    let sector = normalize_optional(snapshot.text("sector"));
    let industry = normalize_optional(snapshot.text("industry"));
    let institution = derive::is_financial_institution(sector.as_deref(), industry.as_deref());

    let market_cap = number("marketCap");
    let enterprise_value = number("enterpriseValue");
    let fcf = data.quarterly.as_ref().and_then(derive::fcf_ttm);

    let mut record = MetricRecord::empty(symbol);
    record.sector = sector;
    record.industry = industry;

    record.set(MetricField::MarketCap, market_cap);
    record.set(MetricField::PeRatio, number("trailingPE"));
    record.set(MetricField::ForwardPe, derive::non_negative(number("forwardPE")));
    record.set(MetricField::PsRatio, number("priceToSalesTrailing12Months"));
    record.set(MetricField::PbRatio, number("priceToBook"));
    record.set(
        MetricField::DividendYield,
        derive::fraction_percent(number("dividendYield")),
    );
    record.set(
        MetricField::ForwardEpsGrowth,
        derive::fraction_percent(number("earningsGrowth")),
    );
    record.set(MetricField::Eps, number("trailingEps"));
    record.set(MetricField::PegRatio, derive::non_negative(number("pegRatio")));
    record.set(MetricField::Roe, derive::fraction_percent(number("returnOnEquity")));
    record.set(
        MetricField::ProfitMargin,
        derive::fraction_percent(number("profitMargins")),
    );
    record.set(
        MetricField::EvToEbitda,
        derive::non_negative(number("enterpriseToEbitda")),
    );

    if let Some(annual) = &data.annual {
        record.set(
            MetricField::RevenueGrowth4y,
            derive::growth_4y(annual, LineItem::TotalRevenue),
        );
        record.set(
            MetricField::EpsGrowth4y,
            derive::growth_4y(annual, LineItem::BasicEps),
        );
    }

    if let Some(quarterly) = &data.quarterly {
        record.set(MetricField::Roa, derive::roaa_ttm(quarterly));
        record.set(MetricField::Roic, derive::roic_ttm(quarterly));
    }

    if !institution {
        record.set(MetricField::CurrentRatio, number("currentRatio"));
        record.set(
            MetricField::DebtToEquity,
            derive::debt_to_equity(number("debtToEquity")),
        );
        record.set(
            MetricField::GrossMargin,
            derive::fraction_percent(number("grossMargins")),
        );
        record.set(MetricField::FcfYield, derive::fcf_yield(fcf, market_cap));
        record.set(MetricField::FcfEv, derive::fcf_to_ev(fcf, enterprise_value));
    }

    record.recent_52_week_high = data.history.as_ref().is_some_and(|history| {
        derive::recent_52_week_high(history, config.recent_sessions, config.history_sessions)
    });

    record
}
