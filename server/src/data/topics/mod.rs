//! Durable log with consumer groups
//!
//! Provides at-least-once delivery with pluggable backends:
//! - In-memory (default) - local-only, for development and tests
//! - Redis (optional) - Redis Streams, shared with external publishers
//!
//! Entries are delivered to exactly one consumer of a group and stay
//! pending until acknowledged. Entries left pending by a crashed consumer
//! can be claimed by another one after an idle period.

mod backend;
mod error;
mod memory;
mod redis;

use std::sync::Arc;

pub use backend::{LogEntry, TopicBackend};
pub use error::TopicError;
pub use memory::MemoryTopicBackend;

use crate::core::config::{BackendKind, TopicsConfig};

/// Topic service wrapping the configured backend
#[derive(Clone)]
pub struct TopicService {
    backend: Arc<dyn TopicBackend>,
}

impl std::fmt::Debug for TopicService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicService")
            .field("backend", &self.backend.backend_name())
            .finish()
    }
}

impl TopicService {
    /// Create the topic service from configuration
    pub async fn new(config: &TopicsConfig) -> Result<Self, TopicError> {
        let backend: Arc<dyn TopicBackend> = match config.backend {
            BackendKind::Memory => {
                tracing::debug!("Initializing in-memory topics");
                Arc::new(MemoryTopicBackend::new())
            }
            BackendKind::Redis => {
                let url = config.redis_url.as_ref().ok_or_else(|| {
                    TopicError::Config("redis_url required for Redis topics".into())
                })?;
                Arc::new(redis::RedisTopicBackend::new(url).await?)
            }
        };
        Ok(Self { backend })
    }

    /// Wrap an existing backend
    pub fn with_backend(backend: Arc<dyn TopicBackend>) -> Self {
        Self { backend }
    }

    /// Access the backend trait object
    pub fn backend(&self) -> Arc<dyn TopicBackend> {
        Arc::clone(&self.backend)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    pub async fn health_check(&self) -> Result<(), TopicError> {
        self.backend.health_check().await
    }
}
