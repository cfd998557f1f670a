use thiserror::Error;

/// Validation and contract errors exposed by `fundscreen-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter or digit: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid exchange '{value}', expected one of tsx, tsxv, nasdaq, nyse")]
    InvalidExchange { value: String },
    #[error("unknown metric field '{value}'")]
    UnknownField { value: String },
    #[error("invalid highlight '{value}', expected one of above, within, below")]
    InvalidHighlight { value: String },
    #[error("invalid source '{value}', expected one of yahoo, fixture")]
    UnknownProvider { value: String },

    #[error("max_workers must be at least 1")]
    InvalidWorkerCount,
    #[error("filter bound '{value}' is not a number")]
    InvalidBound { value: String },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("universe file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("universe csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid filter request: {0}")]
    InvalidFilterRequest(String),

    #[error("universe file has no '{column}' column")]
    MissingColumn { column: &'static str },
}
