pub mod metrics;
pub mod statements;
pub mod symbol;

pub use metrics::{MetricField, MetricRecord};
pub use statements::{
    CompanySnapshot, Frequency, LineItem, PriceHistory, Statement, StatementPeriod,
    StatementTable,
};
pub use symbol::Symbol;
