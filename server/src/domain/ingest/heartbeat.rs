//! Consumer liveness publishing
//!
//! Writes a JSON heartbeat under a well-known cache key on a fixed
//! interval. The key expires after three missed refreshes, so its absence
//! means no consumer is alive.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::constants::{HEARTBEAT_INTERVAL_SECS, HEARTBEAT_TTL_SECS};
use crate::data::cache::{CacheError, CacheKey, CacheService};
use crate::data::topics::TopicBackend;

/// Heartbeat value as read by liveness probes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub timestamp: DateTime<Utc>,
    pub status: String,
    pub consumer_name: String,
    pub group_name: String,
    pub events_processed: u64,
    pub stream_length: u64,
}

/// Periodic heartbeat writer for one consumer
pub struct LivenessPublisher {
    cache: Arc<CacheService>,
    topics: Arc<dyn TopicBackend>,
    stream: String,
    consumer_name: String,
    group_name: String,
    events_processed: Arc<AtomicU64>,
}

impl LivenessPublisher {
    pub fn new(
        cache: Arc<CacheService>,
        topics: Arc<dyn TopicBackend>,
        stream: impl Into<String>,
        consumer_name: impl Into<String>,
        group_name: impl Into<String>,
        events_processed: Arc<AtomicU64>,
    ) -> Self {
        Self {
            cache,
            topics,
            stream: stream.into(),
            consumer_name: consumer_name.into(),
            group_name: group_name.into(),
            events_processed,
        }
    }

    /// Build the current heartbeat and write it with a fresh TTL
    pub async fn publish_once(&self) -> Result<Heartbeat, CacheError> {
        let stream_length = match self.topics.stream_len(&self.stream).await {
            Ok(len) => len,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to read stream length for heartbeat");
                0
            }
        };

        let heartbeat = Heartbeat {
            timestamp: Utc::now(),
            status: "healthy".to_string(),
            consumer_name: self.consumer_name.clone(),
            group_name: self.group_name.clone(),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            stream_length,
        };

        self.cache
            .set_json(
                CacheKey::consumer_heartbeat(),
                &heartbeat,
                Duration::from_secs(HEARTBEAT_TTL_SECS),
            )
            .await?;
        Ok(heartbeat)
    }

    /// Spawn the heartbeat task; it exits when shutdown is signalled
    pub fn start(self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match self.publish_once().await {
                            Ok(beat) => tracing::trace!(
                                events_processed = beat.events_processed,
                                stream_length = beat.stream_length,
                                "Heartbeat published"
                            ),
                            Err(e) => tracing::warn!(error = %e, "Failed to publish heartbeat"),
                        }
                    }
                }
            }

            tracing::debug!("Liveness publisher stopped");
        })
    }
}
