//! Provider adapters implementing [`DataSource`](crate::data_source::DataSource).

pub mod fixture;
pub mod yahoo;

pub use fixture::{FixtureCompany, FixtureSource};
pub use yahoo::{YahooAdapter, YahooAuthManager};
