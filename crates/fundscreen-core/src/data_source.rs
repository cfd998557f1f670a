//! Data source trait and error types.
//!
//! This module defines the adapter contract (`DataSource`) that every
//! fundamentals provider implements. One security is fetched through three
//! independent endpoints:
//!
//! | Endpoint | Response | Description |
//! |----------|----------|-------------|
//! | Snapshot | [`CompanySnapshot`] | Profile, valuation multiples, sector/industry |
//! | Statements | [`StatementTable`] | Quarterly or annual statement line items |
//! | Price history | [`PriceHistory`] | Daily session highs |
//!
//! Each call may fail on its own; the record assembler decides how much of a
//! record survives a partial failure.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{CompanySnapshot, Frequency, PriceHistory, ProviderId, StatementTable, Symbol};

/// Boxed future returned by adapter calls.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Data endpoint type used for capability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Snapshot,
    Statements,
    PriceHistory,
}

impl Endpoint {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Statements => "statements",
            Self::PriceHistory => "price_history",
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported endpoint matrix for a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub snapshot: bool,
    pub statements: bool,
    pub price_history: bool,
}

impl CapabilitySet {
    pub const fn new(snapshot: bool, statements: bool, price_history: bool) -> Self {
        Self {
            snapshot,
            statements,
            price_history,
        }
    }

    pub const fn full() -> Self {
        Self::new(true, true, true)
    }

    pub const fn supports(self, endpoint: Endpoint) -> bool {
        match endpoint {
            Endpoint::Snapshot => self.snapshot,
            Endpoint::Statements => self.statements,
            Endpoint::PriceHistory => self.price_history,
        }
    }
}

/// Health state reported by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Runtime source health snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub state: HealthState,
    pub rate_available: bool,
}

impl HealthStatus {
    pub const fn new(state: HealthState, rate_available: bool) -> Self {
        Self {
            state,
            rate_available,
        }
    }

    pub const fn healthy() -> Self {
        Self::new(HealthState::Healthy, true)
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    NotFound,
    Unavailable,
    RateLimited,
    InvalidRequest,
    Internal,
}

/// Structured source error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    /// The provider does not know the symbol at all.
    pub fn not_found(symbol: &Symbol) -> Self {
        Self {
            kind: SourceErrorKind::NotFound,
            message: format!("symbol '{symbol}' is not known to the provider"),
            retryable: false,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::NotFound => "source.not_found",
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// Source adapter contract.
///
/// | Method | Description |
/// |--------|-------------|
/// | [`id`](DataSource::id) | Provider identifier |
/// | [`capabilities`](DataSource::capabilities) | Supported endpoints |
/// | [`snapshot`](DataSource::snapshot) | Company profile and multiples |
/// | [`statements`](DataSource::statements) | Statement line items |
/// | [`price_history`](DataSource::price_history) | Daily highs |
/// | [`health`](DataSource::health) | Source health |
///
/// Implementations must be `Send + Sync`; the orchestrator shares one
/// instance across all fetch tasks.
pub trait DataSource: Send + Sync {
    fn id(&self) -> ProviderId;

    fn capabilities(&self) -> CapabilitySet;

    /// Fetches the profile snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SourceErrorKind::NotFound`] when the provider does not know
    /// the symbol, or another kind when the call itself failed.
    fn snapshot<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, CompanySnapshot>;

    /// Fetches statement periods at the requested cadence, most recent first.
    fn statements<'a>(
        &'a self,
        symbol: &'a Symbol,
        frequency: Frequency,
    ) -> SourceFuture<'a, StatementTable>;

    /// Fetches roughly one year of daily highs, oldest first.
    fn price_history<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, PriceHistory>;

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_namespaced() {
        let symbol = Symbol::parse("ZZZZ").expect("valid");
        assert_eq!(SourceError::not_found(&symbol).code(), "source.not_found");
        assert_eq!(SourceError::unavailable("down").code(), "source.unavailable");
        assert!(SourceError::rate_limited("slow down").retryable());
        assert!(!SourceError::not_found(&symbol).retryable());
    }

    #[test]
    fn capability_set_answers_per_endpoint() {
        let caps = CapabilitySet::new(true, false, true);
        assert!(caps.supports(Endpoint::Snapshot));
        assert!(!caps.supports(Endpoint::Statements));
        assert!(caps.supports(Endpoint::PriceHistory));
    }
}
