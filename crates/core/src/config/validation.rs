//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Longest accepted session lifetime: one week.
pub const MAX_DURATION_MINUTES: i64 = 7 * 24 * 60;

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
    /// Returns `ConfigError::Missing` if `database.provider` is empty, and
    /// `ConfigError::Invalid` if:
    /// - `session.duration_minutes` is outside 1..=10080
    /// - a cookie name is empty, or both cookies share a name
    /// - a bot pattern does not compile
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.provider.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "database.provider".into(),
                hint: "Set ECHOVERSE_DATABASE__PROVIDER, e.g. sqlite".into(),
            });
        }

        if self.session.duration_minutes < 1 {
            return Err(ConfigError::Invalid {
                field: "session.duration_minutes".into(),
                reason: "must be at least 1 minute".into(),
            });
        }
        if self.session.duration_minutes > MAX_DURATION_MINUTES {
            return Err(ConfigError::Invalid {
                field: "session.duration_minutes".into(),
                reason: format!("must not exceed {MAX_DURATION_MINUTES} minutes"),
            });
        }

        for bot in &self.session.bots {
            if let Err(e) = regex::Regex::new(&bot.pattern) {
                return Err(ConfigError::Invalid {
                    field: "session.bots".into(),
                    reason: format!("pattern for {} does not compile: {e}", bot.name),
                });
            }
        }

        if self.cookies.session_name.is_empty() {
            return Err(ConfigError::Invalid { field: "cookies.session_name".into(), reason: "must not be empty".into() });
        }
        if self.cookies.auth_token_name.is_empty() {
            return Err(ConfigError::Invalid {
                field: "cookies.auth_token_name".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.cookies.session_name == self.cookies.auth_token_name {
            return Err(ConfigError::Invalid {
                field: "cookies.auth_token_name".into(),
                reason: "must differ from cookies.session_name".into(),
            });
        }

        if !self.session.verify_continuity {
            tracing::warn!("session continuity verification is disabled; IP and user-agent changes are accepted");
        }

        Ok(())
    }
}
