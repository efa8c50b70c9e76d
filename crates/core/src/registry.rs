//! Typed key/value registry persisted in the `registry` target.
//!
//! Reads come from the cache only. Writes go to the database, then refresh the
//! `registry` target; unlike session writes, failures propagate to the caller.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::rusqlite::types::Value as SqlValue;

use crate::Error;
use crate::Target;
use crate::cache::CacheProvider;
use crate::db::{Database, Row};

/// A registry value and the type recorded alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum RegistryValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Object(serde_json::Value),
}

impl RegistryValue {
    /// Value of the `type` column.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Boolean(_) => "boolean",
            Self::Object(_) => "object",
        }
    }

    fn encode(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Object(v) => v.to_string(),
        }
    }

    fn decode(kind: &str, raw: &str) -> Option<Self> {
        match kind {
            "string" => Some(Self::String(raw.to_string())),
            "number" => raw.trim().parse().ok().map(Self::Number),
            "boolean" => match raw.trim() {
                "true" | "1" => Some(Self::Boolean(true)),
                "false" | "0" | "" => Some(Self::Boolean(false)),
                _ => None,
            },
            "object" => serde_json::from_str(raw).ok().map(Self::Object),
            _ => None,
        }
    }

    fn from_row(row: &Row) -> Option<Self> {
        let kind = row.text("type")?;
        let raw = match row.get("value")? {
            SqlValue::Text(s) => s.clone(),
            SqlValue::Integer(i) => i.to_string(),
            SqlValue::Real(f) => f.to_string(),
            _ => String::new(),
        };
        let value = Self::decode(kind, &raw);
        if value.is_none() {
            tracing::warn!(key = row.text("name").unwrap_or_default(), kind, "skipping malformed registry entry");
        }
        value
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for RegistryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<&str> for RegistryValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for RegistryValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for RegistryValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for RegistryValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for RegistryValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<serde_json::Value> for RegistryValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Object(value)
    }
}

/// Process-wide settings store backed by the `registry` table.
#[derive(Clone)]
pub struct Registry {
    cache: Arc<dyn CacheProvider>,
    db: Database,
}

impl Registry {
    pub fn new(cache: Arc<dyn CacheProvider>, db: Database) -> Self {
        Self { cache, db }
    }

    pub fn get(&self, key: &str) -> Option<RegistryValue> {
        self.cache
            .get(Target::Registry)
            .iter()
            .find(|row| row.text("name") == Some(key))
            .and_then(RegistryValue::from_row)
    }

    pub fn exists(&self, key: &str) -> bool {
        self.cache.get(Target::Registry).iter().any(|row| row.text("name") == Some(key))
    }

    /// Number of keys currently cached.
    pub fn size(&self) -> usize {
        self.cache.get(Target::Registry).len()
    }

    /// Upsert `key` on its unique name, then refresh the cache.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for an empty key, or the database error if
    /// the write or refresh fails.
    pub async fn set(&self, key: &str, value: impl Into<RegistryValue>) -> Result<(), Error> {
        if key.is_empty() {
            return Err(Error::Validation("registry key must not be empty".into()));
        }

        let value = value.into();
        let modified = Utc::now().timestamp_millis();
        let mut builder = self.db.statement();
        builder
            .insert_into(
                Target::Registry,
                &["name", "value", "type", "lastModification"],
                [
                    SqlValue::Text(key.to_string()),
                    SqlValue::Text(value.encode()),
                    SqlValue::Text(value.kind().into()),
                    modified.into(),
                ],
            )?
            .on_duplicate_key_update(&["value", "type", "lastModification"])?;

        self.db.execute(builder.build()).await?;
        tracing::debug!(key, kind = value.kind(), "registry key set");
        self.cache.update(Target::Registry).await
    }

    /// Delete `key`. Returns `false` if it was not present.
    pub async fn delete(&self, key: &str) -> Result<bool, Error> {
        if !self.exists(key) {
            tracing::debug!(key, "registry key not present; nothing to delete");
            return Ok(false);
        }

        let statement = self
            .db
            .statement()
            .delete_from(Target::Registry)
            .where_clause("name = ?", [key.to_string()])
            .build();
        self.db.execute(statement).await?;
        tracing::debug!(key, "registry key deleted");
        self.cache.update(Target::Registry).await?;
        Ok(true)
    }

    /// Delete every key. Not reversible.
    pub async fn clear(&self) -> Result<usize, Error> {
        let statement = self.db.statement().delete_from(Target::Registry).build();
        let removed = self.db.execute(statement).await?;
        tracing::info!(rows = removed, "registry cleared");
        self.cache.update(Target::Registry).await?;
        Ok(removed)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("db", &self.db).finish_non_exhaustive()
    }
}
