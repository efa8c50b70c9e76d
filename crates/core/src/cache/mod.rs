//! Full-dataset in-memory cache in front of the relational store.
//!
//! Each [`Target`] is cached as its complete row set and replaced wholesale on
//! refresh; there is no row-level patching. Read paths go exclusively through
//! [`CacheProvider::get`] and [`CacheProvider::get_all`], and every write path
//! refreshes the affected targets after its database write succeeds.
//!
//! Between a write and its refresh, readers see the pre-write rows.

pub mod snapshot;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::Error;
use crate::Target;
use crate::db::Row;

pub use snapshot::SnapshotCache;

/// Shared, immutable row set for one target.
pub type Rows = Arc<Vec<Row>>;

/// Contract every cache provider satisfies.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Populate every enumerated target. Fails if any single refresh fails.
    async fn build(&self) -> Result<(), Error>;

    /// Re-read `target` in full and replace its cached rows.
    async fn update(&self, target: Target) -> Result<(), Error>;

    /// [`update`](Self::update) each target in turn.
    async fn update_all(&self, targets: &[Target]) -> Result<(), Error>;

    /// Cached rows for `target`; empty if the target was never populated.
    fn get(&self, target: Target) -> Rows;

    /// Resolve several aliased targets from one cache generation.
    fn get_all<'a>(&self, targets: &[(&'a str, Target)]) -> HashMap<&'a str, Rows>;
}
