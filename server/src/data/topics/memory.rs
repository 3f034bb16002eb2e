//! In-memory topic backend
//!
//! Simulates Redis Streams consumer groups inside one process:
//! entries live in a `VecDeque`, each group tracks its last delivered ID
//! and a pending list of delivered but unacknowledged entries.
//!
//! ## Limitations
//!
//! Suitable for local development and tests only. A process crash loses
//! every entry, and nothing outside the process can publish to it.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Notify;

use super::backend::{LogEntry, TopicBackend};
use super::error::TopicError;

/// Entry stored in a memory stream
#[derive(Clone)]
struct StreamEntry {
    id: u64,
    fields: HashMap<String, String>,
}

impl StreamEntry {
    fn to_log_entry(&self) -> LogEntry {
        LogEntry {
            id: self.id.to_string(),
            fields: self.fields.clone(),
        }
    }
}

/// Delivery record for an unacknowledged entry
#[derive(Clone)]
struct PendingEntry {
    consumer: String,
    delivered_at: Instant,
}

/// Consumer group state for a stream
#[derive(Clone, Default)]
struct ConsumerGroup {
    /// Highest ID handed out to any consumer of the group
    last_delivered: u64,
    /// Pending entries: entry_id -> delivery record
    pending: HashMap<u64, PendingEntry>,
}

/// Stream state
struct StreamState {
    entries: VecDeque<StreamEntry>,
    groups: HashMap<String, ConsumerGroup>,
    next_id: u64,
}

impl Default for StreamState {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
            groups: HashMap::new(),
            next_id: 1,
        }
    }
}

/// Shared state for memory backend
#[derive(Default)]
struct SharedState {
    streams: RwLock<HashMap<String, StreamState>>,
    /// Per-stream notifiers to wake blocked readers on publish
    stream_notifiers: RwLock<HashMap<String, Arc<Notify>>>,
}

/// In-memory topic backend
#[derive(Clone, Default)]
pub struct MemoryTopicBackend {
    state: Arc<SharedState>,
}

impl MemoryTopicBackend {
    /// Create a new in-memory topic backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a consumer group (the memory analogue of `XGROUP DESTROY`)
    ///
    /// Returns false if the group did not exist.
    pub fn destroy_group(&self, stream: &str, group: &str) -> bool {
        self.state
            .streams
            .write()
            .get_mut(stream)
            .is_some_and(|s| s.groups.remove(group).is_some())
    }

    /// Number of entries delivered to `group` and not yet acknowledged
    pub fn pending_count(&self, stream: &str, group: &str) -> usize {
        self.state
            .streams
            .read()
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map_or(0, |g| g.pending.len())
    }

    fn get_or_create_notifier(&self, stream: &str) -> Arc<Notify> {
        {
            let notifiers = self.state.stream_notifiers.read();
            if let Some(notify) = notifiers.get(stream) {
                return Arc::clone(notify);
            }
        }
        let mut notifiers = self.state.stream_notifiers.write();
        Arc::clone(
            notifiers
                .entry(stream.to_string())
                .or_insert_with(|| Arc::new(Notify::new())),
        )
    }

    /// Deliver up to `count` new entries to `consumer`
    fn take_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<LogEntry>, TopicError> {
        let mut streams = self.state.streams.write();
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| TopicError::NoGroup(group.to_string()))?;
        let StreamState { entries, groups, .. } = state;
        let group_state = groups
            .get_mut(group)
            .ok_or_else(|| TopicError::NoGroup(group.to_string()))?;

        let now = Instant::now();
        let mut delivered = Vec::new();
        for entry in entries
            .iter()
            .filter(|e| e.id > group_state.last_delivered)
            .take(count)
        {
            group_state.pending.insert(
                entry.id,
                PendingEntry {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                },
            );
            delivered.push(entry.to_log_entry());
        }
        if let Some(last) = delivered.last().and_then(|e| e.id.parse::<u64>().ok()) {
            group_state.last_delivered = last;
        }
        Ok(delivered)
    }
}

#[async_trait]
impl TopicBackend for MemoryTopicBackend {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), TopicError> {
        let mut streams = self.state.streams.write();
        streams
            .entry(stream.to_string())
            .or_default()
            .groups
            .entry(group.to_string())
            .or_default();
        Ok(())
    }

    async fn stream_read(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<LogEntry>, TopicError> {
        let notify = self.get_or_create_notifier(stream);
        let deadline = Instant::now() + Duration::from_millis(block_ms);

        loop {
            // Register interest before checking so a publish in between is not lost
            let notified = notify.notified();
            let entries = self.take_new(stream, group, consumer, count)?;
            if !entries.is_empty() {
                return Ok(entries);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(vec![]);
            }
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return Ok(vec![]);
            }
        }
    }

    async fn stream_ack(
        &self,
        stream: &str,
        group: &str,
        ids: &[String],
    ) -> Result<u64, TopicError> {
        let mut streams = self.state.streams.write();
        let Some(group_state) = streams
            .get_mut(stream)
            .and_then(|s| s.groups.get_mut(group))
        else {
            return Ok(0);
        };

        let acked = ids
            .iter()
            .filter_map(|id| id.parse::<u64>().ok())
            .filter(|id| group_state.pending.remove(id).is_some())
            .count();
        Ok(acked as u64)
    }

    async fn stream_claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<LogEntry>, TopicError> {
        let mut streams = self.state.streams.write();
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| TopicError::NoGroup(group.to_string()))?;
        let StreamState { entries, groups, .. } = state;
        let group_state = groups
            .get_mut(group)
            .ok_or_else(|| TopicError::NoGroup(group.to_string()))?;

        let min_idle = Duration::from_millis(min_idle_ms);
        let mut idle_ids: Vec<u64> = group_state
            .pending
            .iter()
            .filter(|(_, p)| p.delivered_at.elapsed() >= min_idle)
            .map(|(id, _)| *id)
            .collect();
        idle_ids.sort_unstable();
        idle_ids.truncate(count);

        let now = Instant::now();
        let mut claimed = Vec::with_capacity(idle_ids.len());
        for id in idle_ids {
            let Some(entry) = entries.iter().find(|e| e.id == id) else {
                group_state.pending.remove(&id);
                continue;
            };
            let previous = group_state.pending.insert(
                id,
                PendingEntry {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                },
            );
            if let Some(previous) = previous {
                tracing::trace!(entry_id = id, from = %previous.consumer, to = consumer, "Reassigned pending entry");
            }
            claimed.push(entry.to_log_entry());
        }

        if !claimed.is_empty() {
            tracing::debug!(
                stream,
                group,
                consumer,
                count = claimed.len(),
                "Claimed idle pending entries"
            );
        }
        Ok(claimed)
    }

    async fn stream_len(&self, stream: &str) -> Result<u64, TopicError> {
        Ok(self
            .state
            .streams
            .read()
            .get(stream)
            .map_or(0, |s| s.entries.len() as u64))
    }

    async fn stream_publish(
        &self,
        stream: &str,
        fields: &[(&str, &str)],
    ) -> Result<String, TopicError> {
        let id = {
            let mut streams = self.state.streams.write();
            let state = streams.entry(stream.to_string()).or_default();
            let id = state.next_id;
            state.next_id += 1;
            state.entries.push_back(StreamEntry {
                id,
                fields: fields
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            });
            id
        };

        self.get_or_create_notifier(stream).notify_waiters();
        Ok(id.to_string())
    }

    async fn health_check(&self) -> Result<(), TopicError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
