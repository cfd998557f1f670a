use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{Map, Value};
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::data_source::{
    CapabilitySet, DataSource, HealthState, HealthStatus, SourceError, SourceFuture,
};
use crate::http_client::{
    HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient, ResponseClass,
};
use crate::throttling::RequestThrottle;
use crate::{
    CompanySnapshot, Frequency, LineItem, PriceHistory, ProviderId, StatementPeriod,
    StatementTable, Symbol,
};

const QUERY_HOST: &str = "https://query2.finance.yahoo.com";
const REFERER: &str = "https://finance.yahoo.com/";
const SUMMARY_MODULES: &str = "summaryDetail,defaultKeyStatistics,financialData,assetProfile,price";
/// Earliest statement date requested from the timeseries API (1985-08-23).
const TIMESERIES_START: i64 = 493_590_046;

// ============================================================================
// Yahoo Auth Manager - cookie/crumb session
// ============================================================================

/// Manages the Yahoo session crumb.
///
/// Yahoo's unofficial API requires:
/// 1. A session cookie set by `fc.yahoo.com` (kept in the client cookie jar,
///    or supplied through `YAHOO_COOKIE`)
/// 2. A crumb token from `/v1/test/getcrumb` passed on every data call
#[derive(Debug)]
pub struct YahooAuthManager {
    crumb: Mutex<Option<(String, Instant)>>,
    refresh_gate: tokio::sync::Mutex<()>,
    crumb_ttl: Duration,
}

impl Default for YahooAuthManager {
    fn default() -> Self {
        Self {
            crumb: Mutex::new(None),
            refresh_gate: tokio::sync::Mutex::new(()),
            crumb_ttl: Duration::from_secs(3600),
        }
    }
}

impl YahooAuthManager {
    fn cached_crumb(&self) -> Option<String> {
        let guard = self.crumb.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|(_, fetched_at)| fetched_at.elapsed() < self.crumb_ttl)
            .map(|(crumb, _)| crumb.clone())
    }

    /// Current crumb, refreshing it when missing or expired.
    pub async fn crumb(
        &self,
        http_client: &dyn HttpClient,
        cookie: Option<&str>,
    ) -> Result<String, SourceError> {
        if let Some(crumb) = self.cached_crumb() {
            return Ok(crumb);
        }

        // One task refreshes; the rest wait and reuse its crumb.
        let _gate = self.refresh_gate.lock().await;
        if let Some(crumb) = self.cached_crumb() {
            return Ok(crumb);
        }

        let crumb = fetch_crumb(http_client, cookie).await?;
        *self.crumb.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((crumb.clone(), Instant::now()));
        Ok(crumb)
    }

    /// Drops the cached crumb so the next call refreshes it.
    pub fn invalidate(&self) {
        *self.crumb.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

async fn fetch_crumb(
    http_client: &dyn HttpClient,
    cookie: Option<&str>,
) -> Result<String, SourceError> {
    let cookie_request = HttpRequest::get("https://fc.yahoo.com")
        .with_header("referer", REFERER)
        .with_cookie(cookie);
    // fc.yahoo.com answers 404 but still sets the session cookie.
    http_client
        .execute(cookie_request)
        .await
        .map_err(|e| SourceError::unavailable(format!("failed to fetch Yahoo cookie: {e}")))?;

    let crumb_endpoints = [
        "https://query1.finance.yahoo.com/v1/test/getcrumb",
        "https://query2.finance.yahoo.com/v1/test/getcrumb",
    ];

    for endpoint in crumb_endpoints {
        let request = HttpRequest::get(endpoint)
            .with_header("referer", REFERER)
            .with_cookie(cookie);

        let Ok(response) = http_client.execute(request).await else {
            continue;
        };
        match response.class() {
            ResponseClass::Success => {}
            ResponseClass::RateLimited => {
                return Err(SourceError::rate_limited(
                    "Yahoo rate limited while fetching crumb",
                ));
            }
            _ => continue,
        }

        let body = response.body.trim();
        if body.contains("<html") || body.contains("<!DOCTYPE") {
            continue;
        }
        if body.to_ascii_lowercase().contains("too many requests") {
            return Err(SourceError::rate_limited(
                "Yahoo rate limited while fetching crumb",
            ));
        }
        if !body.is_empty() && body.len() < 100 && !body.contains(char::is_whitespace) {
            return Ok(body.to_owned());
        }
    }

    Err(SourceError::unavailable(
        "failed to fetch Yahoo crumb from all endpoints",
    ))
}

// ============================================================================
// Yahoo Adapter
// ============================================================================

/// Yahoo Finance fundamentals adapter.
#[derive(Clone)]
pub struct YahooAdapter {
    http_client: Arc<dyn HttpClient>,
    /// Session cookie supplied out of band through `YAHOO_COOKIE`.
    cookie: Option<String>,
    circuit_breaker: Arc<CircuitBreaker>,
    throttle: RequestThrottle,
    auth_manager: Arc<YahooAuthManager>,
}

impl Default for YahooAdapter {
    fn default() -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new())).with_cookie(env_cookie())
    }
}

impl YahooAdapter {
    /// Requests per second allowed against the query hosts.
    pub const DEFAULT_RATE_PER_SECOND: u32 = 8;

    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            cookie: None,
            circuit_breaker: Arc::new(CircuitBreaker::default()),
            throttle: RequestThrottle::per_second(Self::DEFAULT_RATE_PER_SECOND),
            auth_manager: Arc::new(YahooAuthManager::default()),
        }
    }

    pub fn with_cookie(mut self, cookie: Option<String>) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_throttle(mut self, throttle: RequestThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    async fn send(&self, url: &str) -> Result<HttpResponse, SourceError> {
        self.throttle.acquire().await;
        let cookie = self.cookie.as_deref();
        let crumb = self
            .auth_manager
            .crumb(self.http_client.as_ref(), cookie)
            .await?;
        let request = HttpRequest::get(format!("{url}&crumb={}", urlencoding::encode(&crumb)))
            .with_header("referer", REFERER)
            .with_cookie(cookie);

        self.http_client.execute(request).await.map_err(|error| {
            if error.retryable() {
                SourceError::unavailable(format!("yahoo transport error: {error}"))
            } else {
                SourceError::internal(format!("yahoo transport error: {error}"))
            }
        })
    }

    /// One guarded upstream call: the breaker admits it and then sees how it
    /// went.
    async fn fetch_body(&self, symbol: &Symbol, url: &str) -> Result<String, SourceError> {
        self.circuit_breaker.permit()?;
        let outcome = self.exchange(symbol, url).await;
        self.circuit_breaker.observe(&outcome);
        outcome
    }

    /// GET with one session refresh on 401/429.
    async fn exchange(&self, symbol: &Symbol, url: &str) -> Result<String, SourceError> {
        let mut response = self.send(url).await?;
        if matches!(
            response.class(),
            ResponseClass::SessionExpired | ResponseClass::RateLimited
        ) {
            self.auth_manager.invalidate();
            response = self.send(url).await?;
        }

        match response.class() {
            ResponseClass::Success => Ok(response.body),
            ResponseClass::NotFound => Err(SourceError::not_found(symbol)),
            ResponseClass::Rejected => Err(SourceError::invalid_request(format!(
                "yahoo rejected the request for '{symbol}' with status {}",
                response.status
            ))),
            ResponseClass::RateLimited => Err(SourceError::rate_limited(
                "yahoo returned status 429 after session refresh",
            )),
            ResponseClass::SessionExpired | ResponseClass::ServerError => Err(
                SourceError::unavailable(format!("yahoo returned status {}", response.status)),
            ),
        }
    }

    async fn fetch_snapshot(&self, symbol: &Symbol) -> Result<CompanySnapshot, SourceError> {
        let url = format!(
            "{QUERY_HOST}/v10/finance/quoteSummary/{}?modules={SUMMARY_MODULES}",
            urlencoding::encode(symbol.as_str()),
        );
        let body = self.fetch_body(symbol, &url).await?;
        parse_quote_summary(symbol, &body)
    }

    async fn fetch_statements(
        &self,
        symbol: &Symbol,
        frequency: Frequency,
    ) -> Result<StatementTable, SourceError> {
        let types = LineItem::ALL
            .iter()
            .map(|item| timeseries_key(frequency, *item))
            .collect::<Vec<_>>()
            .join(",");
        let encoded = urlencoding::encode(symbol.as_str());
        let url = format!(
            "{QUERY_HOST}/ws/fundamentals-timeseries/v1/finance/timeseries/{encoded}?symbol={encoded}&type={types}&period1={TIMESERIES_START}&period2={}",
            OffsetDateTime::now_utc().unix_timestamp(),
        );
        let body = self.fetch_body(symbol, &url).await?;
        parse_timeseries(frequency, &body)
    }

    async fn fetch_price_history(&self, symbol: &Symbol) -> Result<PriceHistory, SourceError> {
        let url = format!(
            "{QUERY_HOST}/v8/finance/chart/{}?range=1y&interval=1d",
            urlencoding::encode(symbol.as_str()),
        );
        let body = self.fetch_body(symbol, &url).await?;
        parse_chart(symbol, &body)
    }
}

fn env_cookie() -> Option<String> {
    std::env::var("YAHOO_COOKIE")
        .ok()
        .filter(|cookie| !cookie.trim().is_empty())
}

impl DataSource for YahooAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Yahoo
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
        Box::pin(self.fetch_statements(symbol, frequency))
    }

    fn price_history<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, PriceHistory> {
        Box::pin(self.fetch_price_history(symbol))
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async move {
            match self.circuit_breaker.state() {
                CircuitState::Closed => HealthStatus::healthy(),
                CircuitState::HalfOpen => HealthStatus::new(HealthState::Degraded, true),
                CircuitState::Open => HealthStatus::new(HealthState::Unhealthy, false),
            }
        })
    }
}

fn timeseries_key(frequency: Frequency, item: LineItem) -> String {
    format!("{}{}", frequency.as_str(), item.series_name())
}

// ============================================================================
// Response parsing
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct YahooApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl YahooApiError {
    fn into_source_error(self, symbol: &Symbol) -> SourceError {
        if self.code.as_deref() == Some("Not Found") {
            return SourceError::not_found(symbol);
        }
        SourceError::unavailable(format!(
            "yahoo API error: {}",
            self.description
                .or(self.code)
                .unwrap_or_else(|| String::from("unknown error"))
        ))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct YahooQuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: YahooQuoteSummaryData,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooQuoteSummaryData {
    #[serde(default)]
    result: Option<Vec<Map<String, Value>>>,
    #[serde(default)]
    error: Option<YahooApiError>,
}

/// Flattens the requested modules into one key/value snapshot. Wrapped
/// numbers (`{"raw": 1.2, "fmt": "1.20"}`) are unwrapped; the first module
/// that reports a key wins.
fn parse_quote_summary(symbol: &Symbol, body: &str) -> Result<CompanySnapshot, SourceError> {
    let response: YahooQuoteSummaryResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::internal(format!("failed to parse yahoo quoteSummary: {e}")))?;

    if let Some(error) = response.quote_summary.error {
        return Err(error.into_source_error(symbol));
    }

    let result = response
        .quote_summary
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| SourceError::not_found(symbol))?;

    let mut snapshot = CompanySnapshot::new();
    let mut seen = std::collections::BTreeSet::new();
    for module in SUMMARY_MODULES.split(',') {
        let Some(Value::Object(fields)) = result.get(module) else {
            continue;
        };
        for (key, value) in fields {
            let Some(value) = unwrap_raw(value) else {
                continue;
            };
            if seen.insert(key.clone()) {
                snapshot.insert(key.clone(), value);
            }
        }
    }

    Ok(snapshot)
}

fn unwrap_raw(value: &Value) -> Option<Value> {
    match value {
        Value::Object(wrapper) => wrapper.get("raw").filter(|raw| raw.is_number()).cloned(),
        Value::Number(_) | Value::String(_) | Value::Bool(_) => Some(value.clone()),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
struct YahooTimeseriesResponse {
    timeseries: YahooTimeseriesData,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooTimeseriesData {
    #[serde(default)]
    result: Option<Vec<Map<String, Value>>>,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooTimeseriesPoint {
    #[serde(rename = "asOfDate")]
    as_of_date: String,
    #[serde(rename = "reportedValue", default)]
    reported_value: Option<YahooRawValue>,
}

/// Yahoo wraps most numbers as `{"raw": ..., "fmt": ...}`.
#[derive(Debug, Clone, Deserialize)]
struct YahooRawValue {
    #[serde(default)]
    raw: Option<f64>,
}

fn parse_timeseries(frequency: Frequency, body: &str) -> Result<StatementTable, SourceError> {
    let response: YahooTimeseriesResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::internal(format!("failed to parse yahoo timeseries: {e}")))?;

    let date_format = format_description!("[year]-[month]-[day]");
    let mut periods: std::collections::BTreeMap<Date, StatementPeriod> =
        std::collections::BTreeMap::new();

    for series in response.timeseries.result.unwrap_or_default() {
        let Some(key) = series
            .get("meta")
            .and_then(|meta| meta.get("type"))
            .and_then(|types| types.get(0))
            .and_then(Value::as_str)
        else {
            continue;
        };
        let Some(item) = key
            .strip_prefix(frequency.as_str())
            .and_then(LineItem::from_series_name)
        else {
            continue;
        };
        let Some(Value::Array(points)) = series.get(key) else {
            continue;
        };

        for point in points {
            let Ok(point) = serde_json::from_value::<YahooTimeseriesPoint>(point.clone()) else {
                continue;
            };
            let Some(value) = point.reported_value.and_then(|v| v.raw) else {
                continue;
            };
            let Ok(as_of) = Date::parse(&point.as_of_date, date_format) else {
                continue;
            };
            let period = periods
                .remove(&as_of)
                .unwrap_or_else(|| StatementPeriod::new(as_of));
            periods.insert(as_of, period.with(item, value));
        }
    }

    Ok(StatementTable::new(frequency, periods.into_values().collect()))
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartResponse {
    chart: YahooChartData,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartData {
    #[serde(default)]
    result: Option<Vec<YahooChartResult>>,
    #[serde(default)]
    error: Option<YahooApiError>,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartResult {
    indicators: YahooChartIndicators,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartIndicators {
    quote: Vec<YahooChartQuote>,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartQuote {
    #[serde(default)]
    high: Vec<Option<f64>>,
}

fn parse_chart(symbol: &Symbol, body: &str) -> Result<PriceHistory, SourceError> {
    let response: YahooChartResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::internal(format!("failed to parse yahoo chart: {e}")))?;

    if let Some(error) = response.chart.error {
        return Err(error.into_source_error(symbol));
    }

    let highs = response
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .and_then(|result| result.indicators.quote.into_iter().next())
        .map(|quote| quote.high.into_iter().flatten().collect())
        .unwrap_or_default();

    Ok(PriceHistory::new(highs))
}
