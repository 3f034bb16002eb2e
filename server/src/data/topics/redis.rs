//! Redis topic backend using Streams
//!
//! Uses Redis Streams for at-least-once delivery:
//! - `XADD` for publishing
//! - `XGROUP CREATE ... MKSTREAM` for group setup
//! - `XREADGROUP` for consuming (consumer groups)
//! - `XACK` for acknowledgment
//! - `XPENDING` + `XCLAIM` for recovery of stuck entries
//!
//! Stream keys are used exactly as configured so that external publishers
//! writing to the same name are read by this consumer.

use std::collections::HashMap;

use async_trait::async_trait;
use deadpool_redis::Pool;
use deadpool_redis::redis::{RedisResult, Value as RedisValue};

use super::backend::{LogEntry, TopicBackend};
use super::error::TopicError;
use crate::data::redis::{RedisBackendType, connect_pool};

/// Redis Streams topic backend
pub struct RedisTopicBackend {
    pool: Pool,
    backend_type: RedisBackendType,
}

impl RedisTopicBackend {
    /// Connect to Redis and validate the connection
    pub async fn new(redis_url: &str) -> Result<Self, TopicError> {
        let (pool, backend_type) = connect_pool(redis_url)
            .await
            .map_err(TopicError::Connection)?;
        Ok(Self { pool, backend_type })
    }
}

fn is_nogroup(err: &deadpool_redis::redis::RedisError) -> bool {
    err.code() == Some("NOGROUP") || err.to_string().contains("NOGROUP")
}

#[async_trait]
impl TopicBackend for RedisTopicBackend {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), TopicError> {
        let mut conn = self.pool.get().await?;

        let result: RedisResult<String> = deadpool_redis::redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("0") // Pick up entries published before the group existed
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(TopicError::ConsumerGroup(format!(
                "Failed to create consumer group {group}: {e}"
            ))),
        }
    }

    async fn stream_read(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<LogEntry>, TopicError> {
        let mut conn = self.pool.get().await?;

        let result: RedisResult<RedisValue> = deadpool_redis::redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(stream)
            .arg(">")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(RedisValue::Nil) => Ok(vec![]),
            Ok(value) => Ok(parse_xreadgroup_response(value)),
            Err(e) if is_nogroup(&e) => Err(TopicError::NoGroup(group.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn stream_ack(
        &self,
        stream: &str,
        group: &str,
        ids: &[String],
    ) -> Result<u64, TopicError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.pool.get().await?;
        let mut cmd = deadpool_redis::redis::cmd("XACK");
        cmd.arg(stream).arg(group);
        for id in ids {
            cmd.arg(id);
        }
        let acked: u64 = cmd.query_async(&mut conn).await?;
        Ok(acked)
    }

    async fn stream_claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<LogEntry>, TopicError> {
        let mut conn = self.pool.get().await?;

        let pending: RedisResult<RedisValue> = deadpool_redis::redis::cmd("XPENDING")
            .arg(idle_pending_args(stream, group, min_idle_ms, count))
            .query_async(&mut conn)
            .await;

        let pending = match pending {
            Ok(value) => value,
            Err(e) if is_nogroup(&e) => return Err(TopicError::NoGroup(group.to_string())),
            Err(e) => return Err(e.into()),
        };

        let ids_to_claim = parse_idle_pending_ids(pending, min_idle_ms);
        if ids_to_claim.is_empty() {
            return Ok(vec![]);
        }

        let mut cmd = deadpool_redis::redis::cmd("XCLAIM");
        cmd.arg(stream).arg(group).arg(consumer).arg(min_idle_ms);
        for id in &ids_to_claim {
            cmd.arg(id);
        }

        let claimed: RedisValue = cmd.query_async(&mut conn).await?;
        Ok(parse_entry_list(&claimed))
    }

    async fn stream_len(&self, stream: &str) -> Result<u64, TopicError> {
        let mut conn = self.pool.get().await?;
        let length: u64 = deadpool_redis::redis::cmd("XLEN")
            .arg(stream)
            .query_async(&mut conn)
            .await?;
        Ok(length)
    }

    async fn stream_publish(
        &self,
        stream: &str,
        fields: &[(&str, &str)],
    ) -> Result<String, TopicError> {
        let mut conn = self.pool.get().await?;
        let mut cmd = deadpool_redis::redis::cmd("XADD");
        cmd.arg(stream).arg("*");
        for (name, value) in fields {
            cmd.arg(*name).arg(*value);
        }
        let id: String = cmd.query_async(&mut conn).await?;
        Ok(id)
    }

    async fn health_check(&self) -> Result<(), TopicError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| TopicError::Connection(e.to_string()))?;

        deadpool_redis::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| TopicError::Connection(e.to_string()))?;

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        self.backend_type.name()
    }
}

/// Parse an XREADGROUP reply: `[[stream, [[id, [f, v, ...]], ...]], ...]`
fn parse_xreadgroup_response(value: RedisValue) -> Vec<LogEntry> {
    let RedisValue::Array(streams) = value else {
        return vec![];
    };

    let mut entries = Vec::new();
    for stream_data in &streams {
        if let RedisValue::Array(parts) = stream_data
            && parts.len() >= 2
        {
            entries.extend(parse_entry_list(&parts[1]));
        }
    }
    entries
}

/// Parse a list of `[id, [f, v, ...]]` pairs, skipping nil (deleted) entries
fn parse_entry_list(value: &RedisValue) -> Vec<LogEntry> {
    let RedisValue::Array(items) = value else {
        return vec![];
    };
    items.iter().filter_map(parse_entry).collect()
}

fn parse_entry(value: &RedisValue) -> Option<LogEntry> {
    let RedisValue::Array(parts) = value else {
        return None;
    };
    if parts.len() < 2 {
        return None;
    }
    let id = redis_string(&parts[0])?;
    let RedisValue::Array(raw_fields) = &parts[1] else {
        return None;
    };
    Some(LogEntry {
        id,
        fields: parse_fields(raw_fields),
    })
}

fn parse_fields(raw: &[RedisValue]) -> HashMap<String, String> {
    raw.chunks_exact(2)
        .filter_map(|pair| Some((redis_string(&pair[0])?, redis_string(&pair[1])?)))
        .collect()
}

fn redis_string(value: &RedisValue) -> Option<String> {
    match value {
        RedisValue::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        RedisValue::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

/// Arguments for an extended XPENDING that only returns entries idle for
/// `min_idle_ms`, so entries reclaimed recently do not fill the window
fn idle_pending_args(stream: &str, group: &str, min_idle_ms: u64, count: usize) -> Vec<String> {
    vec![
        stream.to_string(),
        group.to_string(),
        "IDLE".to_string(),
        min_idle_ms.to_string(),
        "-".to_string(),
        "+".to_string(),
        count.to_string(),
    ]
}

/// Parse an extended XPENDING reply `[[id, consumer, idle_ms, deliveries], ...]`
/// and keep IDs idle for at least `min_idle_ms`
fn parse_idle_pending_ids(value: RedisValue, min_idle_ms: u64) -> Vec<String> {
    let RedisValue::Array(entries) = value else {
        return vec![];
    };

    let mut ids = Vec::new();
    for entry in &entries {
        if let RedisValue::Array(parts) = entry
            && parts.len() >= 3
            && let RedisValue::Int(idle) = &parts[2]
            && u64::try_from(*idle).unwrap_or(0) >= min_idle_ms
            && let Some(id) = redis_string(&parts[0])
        {
            ids.push(id);
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> RedisValue {
        RedisValue::BulkString(s.as_bytes().to_vec())
    }

    fn entry(id: &str, fields: &[(&str, &str)]) -> RedisValue {
        let mut flat = Vec::new();
        for (k, v) in fields {
            flat.push(bulk(k));
            flat.push(bulk(v));
        }
        RedisValue::Array(vec![bulk(id), RedisValue::Array(flat)])
    }

    #[test]
    fn test_parse_xreadgroup_response() {
        let reply = RedisValue::Array(vec![RedisValue::Array(vec![
            bulk("observability:events"),
            RedisValue::Array(vec![
                entry("1-0", &[("type", "trace_start"), ("data", "{}")]),
                entry("2-0", &[("type", "observation_end")]),
            ]),
        ])]);

        let entries = parse_xreadgroup_response(reply);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "1-0");
        assert_eq!(entries[0].field("type"), Some("trace_start"));
        assert_eq!(entries[0].field("data"), Some("{}"));
        assert_eq!(entries[1].field("data"), None);
    }

    #[test]
    fn test_parse_xreadgroup_response_non_array() {
        assert!(parse_xreadgroup_response(RedisValue::Nil).is_empty());
        assert!(parse_xreadgroup_response(RedisValue::Int(3)).is_empty());
    }

    #[test]
    fn test_parse_entry_list_skips_deleted_entries() {
        let reply = RedisValue::Array(vec![
            RedisValue::Nil,
            entry("5-1", &[("type", "observation_error")]),
        ]);
        let entries = parse_entry_list(&reply);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "5-1");
    }

    #[test]
    fn test_parse_fields_ignores_odd_trailing_value() {
        let fields = parse_fields(&[bulk("a"), bulk("1"), bulk("b")]);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("a").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_parse_idle_pending_ids() {
        let reply = RedisValue::Array(vec![
            RedisValue::Array(vec![
                bulk("1-0"),
                bulk("worker-1"),
                RedisValue::Int(120_000),
                RedisValue::Int(1),
            ]),
            RedisValue::Array(vec![
                bulk("2-0"),
                bulk("worker-1"),
                RedisValue::Int(10),
                RedisValue::Int(1),
            ]),
        ]);
        assert_eq!(parse_idle_pending_ids(reply, 60_000), vec!["1-0".to_string()]);
    }

    #[test]
    fn test_idle_pending_args_filter_before_count() {
        let args = idle_pending_args("observability:events", "ingest", 60_000, 100);
        assert_eq!(
            args,
            vec![
                "observability:events",
                "ingest",
                "IDLE",
                "60000",
                "-",
                "+",
                "100"
            ]
        );
    }
}
