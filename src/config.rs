//! Compiler configuration

use crate::error::{ConnectionError, ConnectionResult};
use crate::executor::{LogLevel, LOG_LEVEL_ENV};
use serde::{Deserialize, Serialize};

/// Default page size and upper bound on `first`/`last`
pub const DEFAULT_MAX_ROWS: u64 = 30;

/// Environment variable overriding [`CompilerConfig::max_rows`]
pub const MAX_ROWS_ENV: &str = "DOC_GRAPHQL_MAX_ROWS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompilerConfig {
    /// Page size when no count is given, and the clamp for larger counts
    pub max_rows: u64,
    pub log_level: LogLevel,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            log_level: LogLevel::Off,
        }
    }
}

impl CompilerConfig {
    /// Defaults overridden by `DOC_GRAPHQL_MAX_ROWS` and `DOC_GRAPHQL_LOG_LEVEL`
    pub fn from_env() -> ConnectionResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConnectionResult<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(MAX_ROWS_ENV) {
            config.max_rows = raw.trim().parse().map_err(|_| {
                ConnectionError::configuration(format!("{MAX_ROWS_ENV}='{raw}' is not a row count"))
            })?;
        }
        if let Some(raw) = lookup(LOG_LEVEL_ENV) {
            config.log_level = raw.parse()?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_rows(mut self, max_rows: u64) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn validate(&self) -> ConnectionResult<()> {
        if self.max_rows == 0 {
            return Err(ConnectionError::configuration("max_rows must be at least 1"));
        }
        Ok(())
    }
}
