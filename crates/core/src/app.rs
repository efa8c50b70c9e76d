//! Startup wiring: database, cache, and the services built on them.

use std::sync::Arc;

use crate::Error;
use crate::cache::{CacheProvider, SnapshotCache};
use crate::config::AppConfig;
use crate::db::Database;
use crate::registry::Registry;
use crate::session::SessionLifecycle;

/// Everything a request handler needs, created once at startup.
pub struct Core {
    pub db: Database,
    pub cache: Arc<SnapshotCache>,
    pub sessions: SessionLifecycle,
    pub registry: Registry,
}

impl Core {
    /// Validate the config, connect, migrate, build the cache, and wire the
    /// services.
    ///
    /// # Errors
    ///
    /// Any failure aborts startup: an unsupported provider, a database that
    /// cannot be opened or migrated, or a cache build that fails.
    pub async fn start(config: &AppConfig) -> Result<Self, Error> {
        validate(config)?;
        let db = Database::connect(&config.database).await?;
        Self::assemble(db, config).await
    }

    /// Same as [`start`](Self::start) against a fresh in-memory database.
    pub async fn start_in_memory(config: &AppConfig) -> Result<Self, Error> {
        validate(config)?;
        let db = Database::connect_in_memory(&config.database).await?;
        Self::assemble(db, config).await
    }

    async fn assemble(db: Database, config: &AppConfig) -> Result<Self, Error> {
        let cache = Arc::new(SnapshotCache::new(db.clone()));
        cache.build().await?;

        let sessions = SessionLifecycle::new(
            cache.clone(),
            db.clone(),
            config.session.clone(),
            config.cookies.clone(),
        )?;
        let registry = Registry::new(cache.clone(), db.clone());

        tracing::info!("core services ready");
        Ok(Self { db, cache, sessions, registry })
    }

    /// Close the database connection.
    pub async fn shutdown(self) -> Result<(), Error> {
        self.db.disconnect().await
    }
}

fn validate(config: &AppConfig) -> Result<(), Error> {
    config.validate().map_err(|e| Error::Configuration(e.to_string()))
}
