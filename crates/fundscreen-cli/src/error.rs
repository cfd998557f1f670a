use fundscreen_core::{CoreError, ValidationError};
use fundscreen_warehouse::WarehouseError;
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Input(#[from] CoreError),

    #[error("warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("strict mode failed: warnings={warning_count}")]
    StrictModeViolation { warning_count: usize },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Input(_) => 2,
            Self::Warehouse(_) => 4,
            Self::StrictModeViolation { .. } => 5,
            Self::Serialization(_) | Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_problems_exit_with_usage_code() {
        let error = CliError::from(CoreError::InvalidFilterRequest(String::from("not an object")));
        assert_eq!(error.exit_code(), 2);
        assert_eq!(
            CliError::StrictModeViolation { warning_count: 1 }.exit_code(),
            5
        );
    }
}
