//! Relational store access.
//!
//! [`Database`] owns the single SQLite connection. tokio-rusqlite runs it on a
//! background thread and queues every call, so statements from concurrent
//! requests are serialized by the driver rather than by any locking here.

pub mod migrations;
pub mod row;
pub mod statement;

pub use row::Row;
pub use statement::{Direction, JoinKind, Statement, StatementBuilder};

use std::path::Path;

use tokio_rusqlite::rusqlite::types::Value as SqlValue;
use tokio_rusqlite::{Connection, params_from_iter};

use crate::Error;
use crate::config::{Backend, DatabaseConfig};

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Result of executing a [`Statement`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Rows returned by a `SELECT`.
    Rows(Vec<Row>),
    /// Rows touched by an `INSERT`, `UPDATE` or `DELETE`.
    Affected(usize),
}

/// Database handle.
///
/// Cheap to clone; all clones share the one connection.
#[derive(Clone, Debug)]
pub struct Database {
    conn: Connection,
    backend: Backend,
    prefix: String,
}

impl Database {
    /// Connect to the configured store.
    ///
    /// Creates the SQLite file if it doesn't exist, applies pragmas, and runs
    /// pending migrations.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for providers without a database
    /// implementation, or a database error if opening or migrating fails.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, Error> {
        let (backend, prefix) = Self::resolve(config)?;
        let conn = Self::open(&config.sqlite_path).await?;
        Self::prepare(conn, backend, prefix).await
    }

    /// Connect to an in-memory SQLite database for testing.
    pub async fn connect_in_memory(config: &DatabaseConfig) -> Result<Self, Error> {
        let (backend, prefix) = Self::resolve(config)?;
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::prepare(conn, backend, prefix).await
    }

    fn resolve(config: &DatabaseConfig) -> Result<(Backend, String), Error> {
        match config.backend()? {
            Backend::Sqlite => Ok((Backend::Sqlite, config.table_prefix()?.to_string())),
            Backend::Mysql => Err(Error::Configuration(
                "no database provider available for mysql".into(),
            )),
        }
    }

    async fn open(path: &Path) -> Result<Connection, Error> {
        Connection::open(path).await.map_err(|e| Error::Database(e.into()))
    }

    async fn prepare(conn: Connection, backend: Backend, prefix: String) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        migrations::run(&conn, &prefix).await?;

        tracing::debug!(prefix = %prefix, "connected to the SQLite database");
        Ok(Self { conn, backend, prefix })
    }

    /// A fresh builder bound to this database's backend and table prefix.
    pub fn statement(&self) -> StatementBuilder {
        StatementBuilder::with_backend(self.backend, self.prefix.clone())
    }

    /// Execute a statement.
    ///
    /// Statements starting with `SELECT` return [`QueryResult::Rows`];
    /// everything else returns [`QueryResult::Affected`].
    pub async fn query(&self, statement: Statement) -> Result<QueryResult, Error> {
        let is_read = statement.is_read();
        let (text, params) = statement.into_parts();

        let result = self
            .conn
            .call(move |conn| -> Result<QueryResult, Error> {
                if is_read {
                    let mut stmt = conn.prepare(&text)?;
                    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
                    let rows = stmt
                        .query_map(params_from_iter(params.iter()), |row| {
                            names
                                .iter()
                                .enumerate()
                                .map(|(i, name)| row.get::<_, SqlValue>(i).map(|v| (name.clone(), v)))
                                .collect::<Result<Row, _>>()
                        })?
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(QueryResult::Rows(rows))
                } else {
                    let affected = conn.execute(&text, params_from_iter(params.iter()))?;
                    Ok(QueryResult::Affected(affected))
                }
            })
            .await
            .map_err(Error::from);

        if let Err(e) = &result {
            tracing::error!(error = %e, "query failed");
        }
        result
    }

    /// Execute a read statement and return its rows.
    pub async fn fetch(&self, statement: Statement) -> Result<Vec<Row>, Error> {
        match self.query(statement).await? {
            QueryResult::Rows(rows) => Ok(rows),
            QueryResult::Affected(_) => Err(Error::Validation("fetch() requires a SELECT statement".into())),
        }
    }

    /// Execute a write statement and return the affected-row count.
    pub async fn execute(&self, statement: Statement) -> Result<usize, Error> {
        match self.query(statement).await? {
            QueryResult::Affected(n) => Ok(n),
            QueryResult::Rows(_) => Err(Error::Validation("execute() requires a write statement".into())),
        }
    }

    /// Close the connection. Other clones observe `ConnectionClosed` afterwards.
    pub async fn disconnect(self) -> Result<(), Error> {
        self.conn.close().await.map_err(Error::Database)?;
        tracing::debug!("disconnected from the SQLite database");
        Ok(())
    }
}
