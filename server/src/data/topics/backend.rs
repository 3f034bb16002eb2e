//! Topic backend trait definition
//!
//! A durable, append-only log with consumer groups and at-least-once
//! delivery. Entries stay pending for their consumer until acknowledged.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::TopicError;

/// One log entry with its ID for acknowledgment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Entry ID (Redis stream ID or memory sequence)
    pub id: String,
    /// Flat string field map
    pub fields: HashMap<String, String>,
}

impl LogEntry {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Topic backend trait
///
/// Both in-memory and Redis backends implement this trait.
#[async_trait]
pub trait TopicBackend: Send + Sync {
    /// Create the consumer group at the start of the stream, creating the
    /// stream if needed. An existing group is not an error.
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), TopicError>;

    /// Read up to `count` never-delivered entries for `consumer`, blocking
    /// up to `block_ms` when none are available.
    ///
    /// Returns `TopicError::NoGroup` when the group does not exist.
    async fn stream_read(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<LogEntry>, TopicError>;

    /// Acknowledge entries. Returns how many were pending.
    async fn stream_ack(&self, stream: &str, group: &str, ids: &[String])
    -> Result<u64, TopicError>;

    /// Claim entries pending for at least `min_idle_ms` (any consumer) for
    /// `consumer`, up to `count`.
    async fn stream_claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<LogEntry>, TopicError>;

    /// Number of entries in the stream
    async fn stream_len(&self, stream: &str) -> Result<u64, TopicError>;

    /// Append an entry. Returns its ID.
    async fn stream_publish(
        &self,
        stream: &str,
        fields: &[(&str, &str)],
    ) -> Result<String, TopicError>;

    /// Health check (validates connection)
    async fn health_check(&self) -> Result<(), TopicError>;

    /// Backend name for debugging/logging
    fn backend_name(&self) -> &'static str;
}
