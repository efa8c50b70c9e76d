//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (ECHOVERSE_*, nested keys split on `__`)
//! 2. TOML config file (if ECHOVERSE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::{ConfigError, MAX_DURATION_MINUTES};

use crate::Error;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (ECHOVERSE_*)
/// 2. TOML config file (if ECHOVERSE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub cookies: CookieConfig,
}

/// Relational store selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Backing store identifier (`sqlite` or `mysql`).
    ///
    /// Set via ECHOVERSE_DATABASE__PROVIDER.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Path to the SQLite database file.
    ///
    /// Set via ECHOVERSE_DATABASE__SQLITE_PATH.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,

    /// Table prefix applied when the provider is `sqlite`.
    #[serde(default)]
    pub sqlite_table_prefix: String,

    /// Table prefix applied when the provider is `mysql`.
    #[serde(default)]
    pub mysql_table_prefix: String,
}

/// Session lifecycle knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Minutes from creation until a session row expires.
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: i64,

    /// Destroy sessions whose IP address or user agent changed mid-session.
    #[serde(default)]
    pub verify_continuity: bool,

    /// Ordered bot signatures; the first matching pattern names the bot.
    #[serde(default = "default_bots")]
    pub bots: Vec<BotPattern>,
}

/// One crawler signature matched against the user agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotPattern {
    pub name: String,
    pub pattern: String,
}

/// Cookie names and security flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieConfig {
    #[serde(default = "default_session_cookie")]
    pub session_name: String,

    #[serde(default = "default_auth_token_cookie")]
    pub auth_token_name: String,

    #[serde(default = "default_true")]
    pub http_only: bool,

    #[serde(default)]
    pub secure: bool,

    #[serde(default = "default_cookie_path")]
    pub path: String,

    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default = "default_same_site")]
    pub same_site: String,

    /// Lifetime of the device-token cookie.
    #[serde(default = "default_max_age_seconds")]
    pub max_age_seconds: i64,
}

fn default_provider() -> String {
    "sqlite".into()
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./echoverse.db")
}

fn default_duration_minutes() -> i64 {
    60
}

fn default_bots() -> Vec<BotPattern> {
    [
        ("Googlebot", "(?i)googlebot"),
        ("Bingbot", "(?i)bingbot"),
        ("DuckDuckBot", "(?i)duckduckbot"),
        ("Baiduspider", "(?i)baiduspider"),
        ("YandexBot", "(?i)yandexbot"),
        ("Applebot", "(?i)applebot"),
    ]
    .into_iter()
    .map(|(name, pattern)| BotPattern { name: name.into(), pattern: pattern.into() })
    .collect()
}

fn default_session_cookie() -> String {
    "ECHOVERSE_SESSION".into()
}

fn default_auth_token_cookie() -> String {
    "ECHOVERSE_MEMBER_AUTH_TOKEN".into()
}

fn default_true() -> bool {
    true
}

fn default_cookie_path() -> String {
    "/".into()
}

fn default_same_site() -> String {
    "Lax".into()
}

fn default_max_age_seconds() -> i64 {
    31_536_000 // one year
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            sqlite_path: default_sqlite_path(),
            sqlite_table_prefix: String::new(),
            mysql_table_prefix: String::new(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { duration_minutes: default_duration_minutes(), verify_continuity: false, bots: default_bots() }
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            session_name: default_session_cookie(),
            auth_token_name: default_auth_token_cookie(),
            http_only: true,
            secure: false,
            path: default_cookie_path(),
            domain: None,
            same_site: default_same_site(),
            max_age_seconds: default_max_age_seconds(),
        }
    }
}

/// Supported relational backing stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Mysql,
}

impl DatabaseConfig {
    /// Resolve the configured provider string.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for any identifier other than
    /// `sqlite` or `mysql` (case-insensitive).
    pub fn backend(&self) -> Result<Backend, Error> {
        match self.provider.to_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "mysql" => Ok(Backend::Mysql),
            other => Err(Error::Configuration(format!("unsupported database type: {other}"))),
        }
    }

    /// Table prefix for the active backend.
    pub fn table_prefix(&self) -> Result<&str, Error> {
        Ok(match self.backend()? {
            Backend::Sqlite => &self.sqlite_table_prefix,
            Backend::Mysql => &self.mysql_table_prefix,
        })
    }
}

impl SessionConfig {
    /// Session lifetime as a chrono duration; `None` when out of range.
    pub fn duration(&self) -> Option<chrono::Duration> {
        chrono::Duration::try_minutes(self.duration_minutes)
    }
}

impl AppConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `ECHOVERSE_`
    /// 2. TOML file from `ECHOVERSE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("ECHOVERSE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("ECHOVERSE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
