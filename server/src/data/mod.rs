//! Data storage layer
//!
//! Provides the infrastructure services used by ingestion:
//! - `postgres` - Relational store for production deployments
//! - `memory` - In-process relational store for development and tests
//! - `cache` - In-memory and Redis key/value caching
//! - `redis` - Shared Redis pool setup for cache and topics
//! - `topics` - Durable log with consumer groups (Redis Streams or in-memory)
//! - `types` - Shared data types across all backends
//! - `traits` - Store traits for multi-backend support
//! - `error` - Unified error type for all store backends

pub mod cache;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod redis;
pub mod topics;
pub mod traits;
pub mod types;

pub use memory::MemoryStore;
pub use postgres::PostgresService;

pub use error::DataError;

pub use traits::{IngestStore, IngestTx};

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::config::{DatabaseConfig, StoreBackend};

/// Relational store service enum
///
/// Wraps the underlying backend (in-memory or PostgreSQL) and hands out the
/// `IngestStore` trait object used by the rest of the application.
pub enum StoreService {
    /// In-process store (default, development)
    Memory(Arc<MemoryStore>),
    /// PostgreSQL backend (for production deployments)
    Postgres(Arc<PostgresService>),
}

impl StoreService {
    /// Initialize the store service based on configuration
    pub async fn init(config: &DatabaseConfig) -> Result<Self, DataError> {
        match config.backend {
            StoreBackend::Memory => Ok(Self::Memory(Arc::new(MemoryStore::new()))),
            StoreBackend::Postgres => {
                let postgres = config.postgres.as_ref().ok_or_else(|| {
                    DataError::Config("PostgreSQL configuration required".to_string())
                })?;
                let service = PostgresService::init(postgres).await?;
                Ok(Self::Postgres(Arc::new(service)))
            }
        }
    }

    /// Close the store gracefully
    pub async fn close(&self) {
        match self {
            Self::Memory(_) => {}
            Self::Postgres(p) => p.close().await,
        }
    }

    /// Start the background health check task (PostgreSQL only)
    pub fn start_health_check_task(
        &self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Option<JoinHandle<()>> {
        match self {
            Self::Memory(_) => None,
            Self::Postgres(p) => Some(p.start_health_check_task(shutdown_rx)),
        }
    }

    /// Get the backend type
    pub fn backend(&self) -> StoreBackend {
        match self {
            Self::Memory(_) => StoreBackend::Memory,
            Self::Postgres(_) => StoreBackend::Postgres,
        }
    }

    /// Get the store trait object for data operations
    pub fn repository(&self) -> Arc<dyn IngestStore> {
        match self {
            Self::Memory(m) => Arc::clone(m) as Arc<dyn IngestStore>,
            Self::Postgres(p) => Arc::clone(p) as Arc<dyn IngestStore>,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_by_default() {
        let service = StoreService::init(&DatabaseConfig::default()).await.unwrap();
        assert_eq!(service.backend(), StoreBackend::Memory);
        assert!(service.repository().health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_postgres_backend_requires_config() {
        let config = DatabaseConfig {
            backend: StoreBackend::Postgres,
            postgres: None,
        };
        assert!(matches!(
            StoreService::init(&config).await,
            Err(DataError::Config(_))
        ));
    }
}
