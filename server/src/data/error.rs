//! Unified error type for data layer
//!
//! Wraps errors from both store backends (PostgreSQL and in-memory) so that
//! ingestion code can handle them uniformly.

use thiserror::Error;

/// Unified error type for data layer operations
#[derive(Error, Debug)]
pub enum DataError {
    /// PostgreSQL database error
    #[error("PostgreSQL error: {0}")]
    Postgres(sqlx::Error),

    /// Row references a parent that does not exist
    #[error("Foreign key violation: {table}.{column} references missing '{value}'")]
    ForeignKeyViolation {
        table: &'static str,
        column: &'static str,
        value: String,
    },

    /// Row to update does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Migration failed
    #[error("Migration {version} ({name}) failed on {backend}: {error}")]
    MigrationFailed {
        backend: &'static str,
        version: i32,
        name: String,
        error: String,
    },

    /// Invalid transaction usage (unknown savepoint, closed transaction)
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stored value could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

impl DataError {
    /// Create a PostgreSQL error with preserved context
    pub fn from_postgres(e: sqlx::Error) -> Self {
        Self::Postgres(e)
    }

    /// Check if this is a connection-related error that might be transient
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Postgres(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }

    /// Get the backend name that generated this error
    pub fn backend(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::ForeignKeyViolation { .. } | Self::Transaction(_) => "memory",
            Self::MigrationFailed { backend, .. } => backend,
            Self::NotFound { .. } | Self::Config(_) | Self::Decode(_) => "unknown",
        }
    }
}

/// Convert from the PostgreSQL service error type
impl From<crate::data::postgres::PostgresError> for DataError {
    fn from(e: crate::data::postgres::PostgresError) -> Self {
        match e {
            crate::data::postgres::PostgresError::Database(e)
            | crate::data::postgres::PostgresError::Connect { source: e, .. } => Self::Postgres(e),
            crate::data::postgres::PostgresError::MigrationFailed {
                version,
                name,
                error,
            } => Self::MigrationFailed {
                backend: "postgres",
                version,
                name,
                error,
            },
            crate::data::postgres::PostgresError::Config(msg) => Self::Config(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_failed_error_display() {
        let err = DataError::from(crate::data::postgres::PostgresError::MigrationFailed {
            version: 2,
            name: "add_tokens_estimated".to_string(),
            error: "syntax error".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Migration 2 (add_tokens_estimated) failed on postgres: syntax error"
        );
        assert_eq!(err.backend(), "postgres");
    }

    #[test]
    fn test_foreign_key_violation_display() {
        let err = DataError::ForeignKeyViolation {
            table: "observations",
            column: "trace_id",
            value: "t-1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Foreign key violation: observations.trace_id references missing 't-1'"
        );
    }

    #[test]
    fn test_is_transient() {
        assert!(DataError::Postgres(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!DataError::Postgres(sqlx::Error::RowNotFound).is_transient());
        assert!(!DataError::Config("x".into()).is_transient());
    }

    #[test]
    fn test_from_postgres_error() {
        let err: DataError = crate::data::postgres::PostgresError::Config("bad url".into()).into();
        assert!(matches!(err, DataError::Config(ref m) if m == "bad url"));
    }
}
