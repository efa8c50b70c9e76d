//! Cookie directives handed back to the HTTP layer.

use std::fmt;

use serde::Serialize;

use crate::config::CookieConfig;

/// A cookie the caller must set (or clear) on the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CookieDirective {
    pub name: String,
    pub value: String,
    pub max_age_seconds: i64,
    pub http_only: bool,
    pub secure: bool,
    pub path: String,
    pub domain: Option<String>,
    pub same_site: String,
}

impl CookieDirective {
    /// Set `name` to `value` with the configured flags.
    pub fn set(config: &CookieConfig, name: &str, value: &str, max_age_seconds: i64) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            max_age_seconds,
            http_only: config.http_only,
            secure: config.secure,
            path: config.path.clone(),
            domain: config.domain.clone(),
            same_site: config.same_site.clone(),
        }
    }

    /// Clear `name`: empty value, zero max-age, same flags it was set with.
    pub fn removal(config: &CookieConfig, name: &str) -> Self {
        Self::set(config, name, "", 0)
    }

    pub fn is_removal(&self) -> bool {
        self.max_age_seconds == 0 && self.value.is_empty()
    }
}

/// Renders as a `Set-Cookie` header value.
impl fmt::Display for CookieDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}; Max-Age={}; Path={}", self.name, self.value, self.max_age_seconds, self.path)?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        write!(f, "; SameSite={}", self.same_site)
    }
}
