//! Unified error types for the echoverse core.
//!
//! Variants follow the failure taxonomy of the data-access layer: contract
//! violations (`Configuration`, `Validation`) fail fast, database failures are
//! operational and may be swallowed by best-effort callers.

use tokio_rusqlite::rusqlite;

/// Unified error type for the data-access and session core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unsupported backing store or otherwise unusable configuration.
    #[error("CONFIGURATION: {0}")]
    Configuration(String),

    /// A named resource (target, file) does not exist.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// Malformed arguments handed to the statement builder or a provider.
    #[error("VALIDATION: {0}")]
    Validation(String),

    /// Database operation failed.
    #[error("DATABASE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("DATABASE_ERROR: migration failed: {0}")]
    MigrationFailed(String),
}

impl Error {
    /// Whether the failure is operational and may succeed on a later request.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Database(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Validation("IN list is empty".to_string());
        assert!(err.to_string().starts_with("VALIDATION"));
        assert!(err.to_string().contains("IN list is empty"));
    }

    #[test]
    fn test_only_database_errors_are_transient() {
        assert!(Error::Database(tokio_rusqlite::Error::ConnectionClosed).is_transient());
        assert!(!Error::Validation("x".into()).is_transient());
        assert!(!Error::Configuration("x".into()).is_transient());
        assert!(!Error::NotFound("x".into()).is_transient());
    }

    #[test]
    fn test_from_wrapped_error_unwraps() {
        let wrapped: tokio_rusqlite::Error<Error> = tokio_rusqlite::Error::Error(Error::NotFound("forums".into()));
        let err: Error = wrapped.into();
        assert!(matches!(err, Error::NotFound(name) if name == "forums"));
    }
}
