//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::{AppConfig, MAX_TTL_SECS};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - `max_in_flight` is 0 or exceeds 256
    /// - `max_redirects` exceeds 20
    /// - `default_ttl_secs` is 0 or exceeds `MAX_TTL_SECS` (ten years)
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.max_in_flight == 0 || self.max_in_flight > 256 {
            return Err(ConfigError::Invalid {
                field: "max_in_flight".into(),
                reason: "must be between 1 and 256".into(),
            });
        }

        if self.max_redirects > 20 {
            return Err(ConfigError::Invalid { field: "max_redirects".into(), reason: "must not exceed 20".into() });
        }

        if self.default_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "default_ttl_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.default_ttl_secs > MAX_TTL_SECS {
            return Err(ConfigError::Invalid {
                field: "default_ttl_secs".into(),
                reason: format!("must not exceed {MAX_TTL_SECS} (ten years)"),
            });
        }

        if self.max_in_flight == 1 {
            tracing::warn!(
                max_in_flight = self.max_in_flight,
                "max_in_flight is 1; dispatched calls will run one at a time"
            );
        }

        Ok(())
    }

    /// Require a non-default cache path, for commands that must not write
    /// into the working directory by accident.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `db_path` is empty.
    pub fn require_db_path(&self) -> Result<&std::path::Path, ConfigError> {
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Missing {
                field: "db_path".into(),
                hint: "Set STASHLINE_DB_PATH environment variable".into(),
            });
        }
        Ok(&self.db_path)
    }
}
