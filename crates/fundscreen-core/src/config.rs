use std::env;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Environment override for [`PipelineConfig::max_workers`].
pub const MAX_WORKERS_ENV: &str = "FUNDSCREEN_MAX_WORKERS";

/// Fetch pipeline settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on identifiers fetched concurrently.
    pub max_workers: usize,
    /// Trading sessions in the trailing high window.
    pub history_sessions: usize,
    /// Trading sessions counted as "recent" for the new-high flag.
    pub recent_sessions: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            history_sessions: 252,
            recent_sessions: 20,
        }
    }
}

impl PipelineConfig {
    /// Defaults with `FUNDSCREEN_MAX_WORKERS` applied when it parses.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(workers) = env::var(MAX_WORKERS_ENV)
            .ok()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|workers| *workers > 0)
        {
            config.max_workers = workers;
        }
        config
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Result<Self, ValidationError> {
        if max_workers == 0 {
            return Err(ValidationError::InvalidWorkerCount);
        }
        self.max_workers = max_workers;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_daily_screen() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_workers, 10);
        assert_eq!(config.history_sessions, 252);
        assert_eq!(config.recent_sessions, 20);
    }

    #[test]
    fn rejects_zero_workers() {
        let err = PipelineConfig::default()
            .with_max_workers(0)
            .expect_err("must fail");
        assert_eq!(err, ValidationError::InvalidWorkerCount);
    }
}
