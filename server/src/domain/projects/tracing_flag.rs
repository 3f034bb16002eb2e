//! Cached per-project tracing flag
//!
//! The flag is stored as the raw bytes `true` / `false` so SDK processes
//! sharing the cache can read it without a decoder. Lookups fail open:
//! a missing project or an unreachable store reads as enabled. Only values
//! read from the store are cached.

use std::sync::Arc;
use std::time::Duration;

use crate::core::constants::CACHE_TTL_TRACING_FLAG;
use crate::data::cache::{CacheKey, CacheService};
use crate::data::traits::IngestStore;

fn encode_flag(enabled: bool) -> &'static [u8] {
    if enabled { b"true" } else { b"false" }
}

fn decode_flag(raw: &[u8]) -> Option<bool> {
    match raw {
        b"true" => Some(true),
        b"false" => Some(false),
        _ => None,
    }
}

/// Read-through cache over `projects.tracing_enabled`
#[derive(Clone)]
pub struct TracingFlagCache {
    cache: Arc<CacheService>,
    store: Arc<dyn IngestStore>,
    ttl: Duration,
}

impl TracingFlagCache {
    pub fn new(cache: Arc<CacheService>, store: Arc<dyn IngestStore>) -> Self {
        Self {
            cache,
            store,
            ttl: Duration::from_secs(CACHE_TTL_TRACING_FLAG),
        }
    }

    /// Whether tracing is enabled for a project
    pub async fn is_enabled(&self, project_id: &str) -> bool {
        let key = CacheKey::tracing_enabled(project_id);

        match self.cache.get_raw(&key).await {
            Ok(Some(raw)) => match decode_flag(&raw) {
                Some(enabled) => return enabled,
                None => tracing::debug!(project_id, "Unrecognized cached tracing flag, reloading"),
            },
            Ok(None) => {}
            Err(e) => tracing::debug!(error = %e, project_id, "Tracing flag cache read failed"),
        }

        let enabled = match self.store.project_tracing_enabled(project_id).await {
            Ok(Some(enabled)) => enabled,
            Ok(None) => {
                tracing::warn!(project_id, "Project not found, tracing defaults to enabled");
                true
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    project_id,
                    "Failed to load tracing flag, defaulting to enabled"
                );
                return true;
            }
        };

        if let Err(e) = self
            .cache
            .set_raw(&key, encode_flag(enabled).to_vec(), self.ttl)
            .await
        {
            tracing::debug!(error = %e, project_id, "Failed to cache tracing flag");
        }
        enabled
    }

    /// Overwrite the cached flag after the project row changed
    pub async fn invalidate(&self, project_id: &str, enabled: bool) {
        let key = CacheKey::tracing_enabled(project_id);
        match self
            .cache
            .set_raw(&key, encode_flag(enabled).to_vec(), self.ttl)
            .await
        {
            Ok(()) => tracing::debug!(project_id, enabled, "Tracing flag cache updated"),
            Err(e) => {
                tracing::warn!(error = %e, project_id, "Failed to update tracing flag cache")
            }
        }
    }
}
