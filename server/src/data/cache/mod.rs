//! Expiring key/value cache
//!
//! Holds the consumer heartbeat and the per-project tracing flags.
//! Backends:
//! - In-memory (default) - moka with per-entry TTLs
//! - Redis - deadpool-redis, shared with liveness probes of other services
//!
//! Typed values are JSON so external probes can read them.

mod backend;
mod error;
mod key;
mod memory;
mod redis;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use backend::CacheBackend;
pub use error::CacheError;
pub use key::CacheKey;

use memory::InMemoryCache;

use crate::core::config::{BackendKind, CacheConfig};

/// Cache service providing typed access to cache backend
pub struct CacheService {
    backend: Arc<dyn CacheBackend>,
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("backend", &self.backend.backend_name())
            .finish()
    }
}

impl CacheService {
    /// Create a new cache service from configuration
    pub async fn new(config: &CacheConfig) -> Result<Self, CacheError> {
        let backend: Arc<dyn CacheBackend> = match config.backend {
            BackendKind::Memory => {
                tracing::debug!(
                    max_entries = config.max_entries,
                    "Initializing in-memory cache"
                );
                Arc::new(InMemoryCache::new(config.max_entries))
            }
            BackendKind::Redis => {
                let url = config.redis_url.as_ref().ok_or_else(|| {
                    CacheError::Config("redis_url required for Redis backend".into())
                })?;
                Arc::new(redis::RedisCache::new(url).await?)
            }
        };

        Ok(Self { backend })
    }

    /// Wrap an existing backend
    pub fn with_backend(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Read raw bytes
    pub async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.backend.get(key).await
    }

    /// Write raw bytes expiring after `ttl`
    pub async fn set_raw(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.backend.put(key, value, ttl).await
    }

    /// Read and decode a JSON value
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.get_raw(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Encode and write a JSON value expiring after `ttl`
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value)?;
        self.set_raw(key, bytes, ttl).await
    }

    /// Time left before `key` expires
    pub async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        self.backend.remaining_ttl(key).await
    }

    pub async fn health_check(&self) -> Result<(), CacheError> {
        self.backend.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(15);

    fn test_config() -> CacheConfig {
        CacheConfig {
            backend: BackendKind::Memory,
            max_entries: 1000,
            redis_url: None,
        }
    }

    #[tokio::test]
    async fn test_cache_service_backend_name() {
        let service = CacheService::new(&test_config()).await.unwrap();
        assert_eq!(service.backend_name(), "memory");
        assert!(service.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_redis_backend_requires_url() {
        let config = CacheConfig {
            backend: BackendKind::Redis,
            max_entries: 1000,
            redis_url: None,
        };
        assert!(matches!(
            CacheService::new(&config).await,
            Err(CacheError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_json_get_set() {
        let service = CacheService::new(&test_config()).await.unwrap();

        #[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
        struct Beat {
            status: String,
            events_processed: u64,
        }

        let beat = Beat {
            status: "healthy".to_string(),
            events_processed: 3,
        };

        service.set_json("beat", &beat, TTL).await.unwrap();
        let raw = service.get_raw("beat").await.unwrap().unwrap();
        assert_eq!(raw, br#"{"status":"healthy","events_processed":3}"#.to_vec());

        let fetched: Option<Beat> = service.get_json("beat").await.unwrap();
        assert_eq!(fetched, Some(beat));
        assert!(service.ttl("beat").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_get_json_rejects_garbage() {
        let service = CacheService::new(&test_config()).await.unwrap();
        service.set_raw("k", b"\xff".to_vec(), TTL).await.unwrap();
        let result = service.get_json::<serde_json::Value>("k").await;
        assert!(matches!(result, Err(CacheError::Codec(_))));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let service = CacheService::new(&test_config()).await.unwrap();
        assert_eq!(service.get_raw("nope").await.unwrap(), None);
        assert_eq!(service.get_json::<u64>("nope").await.unwrap(), None);
        assert_eq!(service.ttl("nope").await.unwrap(), None);
    }
}
