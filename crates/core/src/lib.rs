//! Data-access and session core for the echoverse bulletin board.
//!
//! This crate provides:
//! - A parameterized SQL statement builder over a SQLite backend
//! - A full-dataset in-memory cache of every board table
//! - The per-request session lifecycle (guest, member, destroy)
//! - A typed key/value registry
//! - Unified error types and layered configuration

pub mod app;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod registry;
pub mod session;
pub mod target;

pub use app::Core;
pub use cache::{CacheProvider, SnapshotCache};
pub use config::AppConfig;
pub use db::{Database, Row, Statement, StatementBuilder};
pub use error::Error;
pub use registry::{Registry, RegistryValue};
pub use session::{SessionLifecycle, SessionOutcome, SessionRequest, SessionState};
pub use target::Target;
