//! Snapshot-per-target cache provider.
//!
//! Each target maps to an `Arc<Vec<Row>>`. A refresh builds the new row list
//! off to the side and swaps the `Arc` under a short write lock, so a reader
//! holding the previous generation keeps iterating it undisturbed.
//!
//! Refreshes of one target run one at a time, so rows are installed in the
//! order they were read.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use futures::lock::Mutex;
use parking_lot::RwLock;

use super::{CacheProvider, Rows};
use crate::Error;
use crate::Target;
use crate::db::Database;

/// In-memory cache holding every target's full row set.
#[derive(Debug)]
pub struct SnapshotCache {
    db: Database,
    snapshot: RwLock<HashMap<Target, Rows>>,
    refreshing: HashMap<Target, Mutex<()>>,
}

impl SnapshotCache {
    /// Create an empty cache. Call [`CacheProvider::build`] before serving.
    pub fn new(db: Database) -> Self {
        let refreshing = Target::ALL.iter().map(|target| (*target, Mutex::new(()))).collect();
        Self { db, snapshot: RwLock::new(HashMap::new()), refreshing }
    }

    /// Whether `target` has been loaded at least once.
    pub fn contains(&self, target: Target) -> bool {
        self.snapshot.read().contains_key(&target)
    }

    /// Row count per populated target.
    pub fn row_counts(&self) -> Vec<(Target, usize)> {
        let snapshot = self.snapshot.read();
        let mut counts: Vec<_> = snapshot.iter().map(|(t, rows)| (*t, rows.len())).collect();
        counts.sort_by_key(|(t, _)| *t);
        counts
    }
}

#[async_trait]
impl CacheProvider for SnapshotCache {
    async fn build(&self) -> Result<(), Error> {
        tracing::info!(targets = Target::ALL.len(), "building the cache");

        try_join_all(Target::ALL.iter().map(|target| self.update(*target)))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "the cache building process failed"))?;

        Ok(())
    }

    async fn update(&self, target: Target) -> Result<(), Error> {
        let Some(lock) = self.refreshing.get(&target) else {
            return Err(Error::NotFound(format!("no cache slot for {target}")));
        };
        let _refresh = lock.lock().await;

        let statement = self.db.statement().select(&[]).from(target).build();

        let rows = self.db.fetch(statement).await.inspect_err(|e| {
            tracing::error!(table = %target, error = %e, "failed to update cache");
        })?;

        if rows.is_empty() {
            tracing::warn!(table = %target, "no data returned for target");
        }

        tracing::debug!(table = %target, rows = rows.len(), "cache target refreshed");
        self.snapshot.write().insert(target, Arc::new(rows));
        Ok(())
    }

    async fn update_all(&self, targets: &[Target]) -> Result<(), Error> {
        for target in targets {
            self.update(*target).await?;
        }
        Ok(())
    }

    fn get(&self, target: Target) -> Rows {
        self.snapshot.read().get(&target).cloned().unwrap_or_default()
    }

    fn get_all<'a>(&self, targets: &[(&'a str, Target)]) -> HashMap<&'a str, Rows> {
        let snapshot = self.snapshot.read();
        targets
            .iter()
            .map(|(alias, target)| (*alias, snapshot.get(target).cloned().unwrap_or_default()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use tokio_rusqlite::rusqlite::types::Value as SqlValue;

    async fn cache() -> SnapshotCache {
        let db = Database::connect_in_memory(&DatabaseConfig::default()).await.unwrap();
        SnapshotCache::new(db)
    }

    async fn add_category(cache: &SnapshotCache, title: &str) {
        let mut insert = cache.db.statement();
        insert
            .insert_into(Target::Categories, &["title"], [SqlValue::Text(title.into())])
            .unwrap();
        cache.db.execute(insert.build()).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_before_build_is_empty() {
        let cache = cache().await;
        assert!(cache.get(Target::Forums).is_empty());
        assert!(!cache.contains(Target::Forums));
    }

    #[tokio::test]
    async fn test_build_populates_every_target() {
        let cache = cache().await;
        add_category(&cache, "Announcements").await;

        cache.build().await.unwrap();

        for target in Target::ALL {
            assert!(cache.contains(target), "{target} missing after build");
        }
        assert_eq!(cache.get(Target::Categories).len(), 1);
        assert!(cache.get(Target::Posts).is_empty());
        assert_eq!(cache.row_counts().len(), Target::ALL.len());
    }

    #[tokio::test]
    async fn test_update_replaces_whole_target() {
        let cache = cache().await;
        add_category(&cache, "Old").await;
        cache.update(Target::Categories).await.unwrap();
        assert_eq!(cache.get(Target::Categories)[0].text("title"), Some("Old"));

        let delete = cache
            .db
            .statement()
            .delete_from(Target::Categories)
            .where_clause("title = ?", ["Old".to_string()])
            .build();
        cache.db.execute(delete).await.unwrap();
        add_category(&cache, "New").await;

        cache.update(Target::Categories).await.unwrap();

        let rows = cache.get(Target::Categories);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("title"), Some("New"));
    }

    #[tokio::test]
    async fn test_reader_keeps_previous_generation() {
        let cache = cache().await;
        add_category(&cache, "First").await;
        cache.update(Target::Categories).await.unwrap();

        let held = cache.get(Target::Categories);
        add_category(&cache, "Second").await;
        cache.update(Target::Categories).await.unwrap();

        assert_eq!(held.len(), 1);
        assert_eq!(cache.get(Target::Categories).len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refreshes_keep_latest_rows() {
        let cache = Arc::new(cache().await);

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    add_category(&cache, &format!("Category {i}")).await;
                    cache.update(Target::Categories).await.unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(cache.get(Target::Categories).len(), 8);
    }

    #[tokio::test]
    async fn test_get_all_resolves_aliases() {
        let cache = cache().await;
        add_category(&cache, "Lounge").await;
        cache.update_all(&[Target::Categories, Target::Sessions]).await.unwrap();

        let data = cache.get_all(&[
            ("cats", Target::Categories),
            ("sessions", Target::Sessions),
            ("widgets", Target::Widgets),
        ]);

        assert_eq!(data.len(), 3);
        assert_eq!(data["cats"].len(), 1);
        assert!(data["sessions"].is_empty());
        assert!(data["widgets"].is_empty());
    }

    #[tokio::test]
    async fn test_update_fails_when_connection_closed() {
        let cache = cache().await;
        cache.db.clone().disconnect().await.unwrap();

        let result = cache.update(Target::Members).await;
        assert!(matches!(result, Err(e) if e.is_transient()));
        assert!(cache.build().await.is_err());
    }
}
