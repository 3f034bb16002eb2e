//! PostgreSQL error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostgresError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Pool could not open its first connections (URL has the password masked)
    #[error("Cannot connect to PostgreSQL at {url}: {source}")]
    Connect { url: String, source: sqlx::Error },

    #[error("Migration {version} ({name}) failed: {error}")]
    MigrationFailed {
        version: i32,
        name: String,
        error: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_shows_masked_url() {
        let err = PostgresError::Connect {
            url: "postgres://tracehouse:***@db/traces".to_string(),
            source: sqlx::Error::PoolTimedOut,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Cannot connect to PostgreSQL at postgres://tracehouse:***@db/traces"));
        assert!(!msg.contains("s3cret"));
    }

    #[test]
    fn test_migration_failed_display() {
        let err = PostgresError::MigrationFailed {
            version: 2,
            name: "add_tokens_estimated".to_string(),
            error: "syntax error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Migration 2 (add_tokens_estimated) failed: syntax error"
        );
    }
}
