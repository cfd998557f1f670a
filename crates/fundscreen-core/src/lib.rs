//! Core of the fundscreen stock screener.
//!
//! This crate contains:
//! - Domain models (symbols, provider payloads, metric records)
//! - Metric derivation and the per-security record assembler
//! - The concurrent fetch orchestrator
//! - Sector-relative classification and the filter engine
//! - Data source traits and provider adapters
//! - Universe file loading

pub mod adapters;
pub mod assemble;
pub mod category;
pub mod circuit_breaker;
pub mod classify;
pub mod config;
pub mod data_source;
pub mod derive;
pub mod domain;
pub mod error;
pub mod filter;
pub mod http_client;
pub mod pipeline;
pub mod source;
pub mod throttling;
pub mod universe;

pub use adapters::{FixtureCompany, FixtureSource, YahooAdapter};
pub use assemble::{assemble_record, derive_record, ProviderData};
pub use category::{normalize_category, normalize_optional};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use classify::{classify, Classification, Highlight, HighlightRecord, SectorBaseline};
pub use config::PipelineConfig;
pub use data_source::{
    CapabilitySet, DataSource, Endpoint, HealthState, HealthStatus, SourceError, SourceErrorKind,
};
pub use domain::{
    CompanySnapshot, Frequency, LineItem, MetricField, MetricRecord, PriceHistory, Statement,
    StatementPeriod, StatementTable, Symbol,
};
pub use error::{CoreError, ValidationError};
pub use filter::{
    filter, parse_bound, FilterKey, FilterPredicate, FilterRequest, JoinedRow, ScreenRow,
};
pub use http_client::{
    HttpClient, HttpError, HttpFuture, HttpRequest, HttpResponse, ReqwestHttpClient, ResponseClass,
};
pub use pipeline::{run_fetch_and_derive, FetchFailure, FetchOrchestrator, FetchReport, StopHandle};
pub use source::ProviderId;
pub use throttling::RequestThrottle;
pub use universe::{load_universe, parse_universe, Exchange, RejectedEntry, UniverseLoad};
