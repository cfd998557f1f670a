use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use time::{Date, Month};

use crate::data_source::{
    CapabilitySet, DataSource, Endpoint, HealthStatus, SourceError, SourceFuture,
};
use crate::{
    CompanySnapshot, Frequency, LineItem, PriceHistory, ProviderId, StatementPeriod,
    StatementTable, Symbol,
};

/// Canned responses for one company. A `None` endpoint fails as unavailable;
/// an endpoint listed in `no_data` answers not-found.
#[derive(Debug, Clone, Default)]
pub struct FixtureCompany {
    pub snapshot: Option<CompanySnapshot>,
    pub annual: Option<StatementTable>,
    pub quarterly: Option<StatementTable>,
    pub history: Option<PriceHistory>,
    pub no_data: Vec<Endpoint>,
}

impl FixtureCompany {
    pub fn new(snapshot: CompanySnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
            annual: Some(StatementTable::empty(Frequency::Annual)),
            quarterly: Some(StatementTable::empty(Frequency::Quarterly)),
            history: Some(PriceHistory::default()),
            no_data: Vec::new(),
        }
    }

    pub fn with_annual(mut self, annual: StatementTable) -> Self {
        self.annual = Some(annual);
        self
    }

    pub fn with_quarterly(mut self, quarterly: StatementTable) -> Self {
        self.quarterly = Some(quarterly);
        self
    }

    pub fn with_history(mut self, history: PriceHistory) -> Self {
        self.history = Some(history);
        self
    }

    pub fn failing(mut self, endpoint: Endpoint) -> Self {
        match endpoint {
            Endpoint::Snapshot => self.snapshot = None,
            Endpoint::Statements => {
                self.annual = None;
                self.quarterly = None;
            }
            Endpoint::PriceHistory => self.history = None,
        }
        self
    }

    /// The provider has nothing for `endpoint`, as with a delisted chart.
    pub fn without_data(mut self, endpoint: Endpoint) -> Self {
        self.no_data.push(endpoint);
        self
    }

    /// Every endpoint fails.
    pub fn unavailable() -> Self {
        Self::default()
    }
}

/// In-memory provider used by tests and `--mock` runs.
///
/// Symbols without an entry answer every call with not-found.
#[derive(Debug, Default)]
pub struct FixtureSource {
    companies: BTreeMap<Symbol, FixtureCompany>,
    latency: Option<Duration>,
    snapshot_calls: Mutex<BTreeMap<Symbol, usize>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_company(mut self, symbol: Symbol, company: FixtureCompany) -> Self {
        self.companies.insert(symbol, company);
        self
    }

    /// Delays each snapshot call, so concurrent fetches overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Deterministic plausible companies for each symbol.
    pub fn demo<'a>(symbols: impl IntoIterator<Item = &'a Symbol>) -> Self {
        symbols.into_iter().fold(Self::new(), |source, symbol| {
            source.with_company(symbol.clone(), demo_company(symbol))
        })
    }

    /// Snapshot calls issued for `symbol`.
    pub fn snapshot_calls(&self, symbol: &Symbol) -> usize {
        self.snapshot_calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(symbol)
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of snapshot calls observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn company(&self, symbol: &Symbol) -> Result<&FixtureCompany, SourceError> {
        self.companies
            .get(symbol)
            .ok_or_else(|| SourceError::not_found(symbol))
    }

    fn serving(
        &self,
        symbol: &Symbol,
        endpoint: Endpoint,
    ) -> Result<&FixtureCompany, SourceError> {
        let company = self.company(symbol)?;
        if company.no_data.contains(&endpoint) {
            return Err(SourceError::not_found(symbol));
        }
        Ok(company)
    }

    async fn fetch_snapshot(&self, symbol: &Symbol) -> Result<CompanySnapshot, SourceError> {
        *self
            .snapshot_calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(symbol.clone())
            .or_default() += 1;

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.serving(symbol, Endpoint::Snapshot)?
            .snapshot
            .clone()
            .ok_or_else(|| unavailable(symbol, Endpoint::Snapshot))
    }
}

fn unavailable(symbol: &Symbol, endpoint: Endpoint) -> SourceError {
    SourceError::unavailable(format!("fixture {endpoint} for '{symbol}' is unavailable"))
}

impl DataSource for FixtureSource {
    fn id(&self) -> ProviderId {
        ProviderId::Fixture
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full()
    }

    fn snapshot<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, CompanySnapshot> {
        Box::pin(self.fetch_snapshot(symbol))
    }

    fn statements<'a>(
        &'a self,
        symbol: &'a Symbol,
        frequency: Frequency,
    ) -> SourceFuture<'a, StatementTable> {
        Box::pin(async move {
            let company = self.serving(symbol, Endpoint::Statements)?;
            let table = match frequency {
                Frequency::Annual => company.annual.clone(),
                Frequency::Quarterly => company.quarterly.clone(),
            };
            table.ok_or_else(|| unavailable(symbol, Endpoint::Statements))
        })
    }

    fn price_history<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, PriceHistory> {
        Box::pin(async move {
            self.serving(symbol, Endpoint::PriceHistory)?
                .history
                .clone()
                .ok_or_else(|| unavailable(symbol, Endpoint::PriceHistory))
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async { HealthStatus::healthy() })
    }
}

// ============================================================================
// Demo data
// ============================================================================

const DEMO_PROFILES: [(&str, &str); 6] = [
    ("Technology", "Software - Infrastructure"),
    ("Technology", "Semiconductors"),
    ("Energy", "Oil & Gas Integrated"),
    ("Financial Services", "Banks - Diversified"),
    ("Industrials", "Railroads"),
    ("Consumer Defensive", "Grocery Stores"),
];

fn symbol_seed(symbol: &Symbol) -> u64 {
    symbol
        .as_str()
        .bytes()
        .fold(7_u64, |acc, byte| acc.wrapping_mul(33).wrapping_add(u64::from(byte)))
}

/// Scales `base` by a factor in [0.5, 1.5) drawn from `seed` and `salt`.
fn jitter(seed: u64, salt: u64, base: f64) -> f64 {
    let mixed = seed
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(salt.wrapping_mul(1_442_695_040_888_963_407));
    let unit = ((mixed >> 33) % 1_000) as f64 / 1_000.0;
    base * (0.5 + unit)
}

fn demo_company(symbol: &Symbol) -> FixtureCompany {
    let seed = symbol_seed(symbol);
    let (sector, industry) = DEMO_PROFILES[(seed % DEMO_PROFILES.len() as u64) as usize];

    let market_cap = jitter(seed, 1, 40_000_000_000.0);
    let snapshot = CompanySnapshot::new()
        .with("sector", sector)
        .with("industry", industry)
        .with("marketCap", market_cap)
        .with("enterpriseValue", market_cap * jitter(seed, 2, 1.1))
        .with("trailingPE", jitter(seed, 3, 22.0))
        .with("forwardPE", jitter(seed, 4, 18.0))
        .with("priceToSalesTrailing12Months", jitter(seed, 5, 4.0))
        .with("priceToBook", jitter(seed, 6, 3.5))
        .with("dividendYield", jitter(seed, 7, 0.02))
        .with("currentRatio", jitter(seed, 8, 1.4))
        .with("debtToEquity", jitter(seed, 9, 80.0))
        .with("earningsGrowth", jitter(seed, 10, 0.08) - 0.03)
        .with("trailingEps", jitter(seed, 11, 5.0))
        .with("pegRatio", jitter(seed, 12, 1.8))
        .with("returnOnEquity", jitter(seed, 13, 0.15))
        .with("profitMargins", jitter(seed, 14, 0.12))
        .with("grossMargins", jitter(seed, 15, 0.45))
        .with("enterpriseToEbitda", jitter(seed, 16, 14.0));

    let quarter_ends = [
        (2025, Month::June, 30),
        (2025, Month::March, 31),
        (2024, Month::December, 31),
        (2024, Month::September, 30),
        (2024, Month::June, 30),
    ];
    let quarterly = quarter_ends
        .iter()
        .enumerate()
        .filter_map(|(index, (year, month, day))| {
            let as_of = Date::from_calendar_date(*year, *month, *day).ok()?;
            let salt = 100 + index as u64 * 10;
            let assets = jitter(seed, salt, market_cap * 0.6);
            Some(
                StatementPeriod::new(as_of)
                    .with(
                        LineItem::OperatingCashFlow,
                        jitter(seed, salt + 1, market_cap * 0.015),
                    )
                    .with(
                        LineItem::CapitalExpenditure,
                        -jitter(seed, salt + 2, market_cap * 0.004),
                    )
                    .with(LineItem::NetIncome, jitter(seed, salt + 3, market_cap * 0.01))
                    .with(LineItem::StockholdersEquity, assets * 0.45)
                    .with(LineItem::LongTermDebt, assets * 0.25)
                    .with(LineItem::CurrentDebt, assets * 0.03)
                    .with(LineItem::TotalAssets, assets),
            )
        })
        .collect();

    let first_year_end = Date::from_calendar_date(2024, Month::December, 31).ok();
    let revenue = jitter(seed, 200, market_cap * 0.3);
    let eps = jitter(seed, 201, 5.0);
    let growth = 1.0 + jitter(seed, 202, 0.08) - 0.02;
    let annual = first_year_end
        .map(|end| {
            (0..5_i32)
                .filter_map(|years_back| {
                    let as_of = end.replace_year(end.year() - years_back).ok()?;
                    let scale = growth.powi(-years_back);
                    Some(
                        StatementPeriod::new(as_of)
                            .with(LineItem::TotalRevenue, revenue * scale)
                            .with(LineItem::BasicEps, eps * scale),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    let sessions = 252_usize;
    let drift = jitter(seed, 300, 0.002) - 0.001;
    let start = jitter(seed, 301, 120.0);
    let highs = (0..sessions)
        .map(|day| {
            let wobble = jitter(seed, 400 + day as u64, 1.0) * 0.02;
            start * (1.0 + drift).powi(day as i32) * (1.0 + wobble)
        })
        .collect();

    FixtureCompany::new(snapshot)
        .with_quarterly(StatementTable::new(Frequency::Quarterly, quarterly))
        .with_annual(StatementTable::new(Frequency::Annual, annual))
        .with_history(PriceHistory::new(highs))
}
