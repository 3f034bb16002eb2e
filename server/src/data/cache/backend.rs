//! Expiring key/value store used for liveness and per-project flags

use std::time::Duration;

use async_trait::async_trait;

use super::error::CacheError;

/// Cache backend trait
///
/// Every value is written with a time-to-live: heartbeats must vanish when
/// the consumer dies and flags must eventually pick up store changes.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read a live value
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Write a value that expires after `ttl`, replacing any previous value
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Time left before `key` expires, `None` when it is absent
    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    async fn health_check(&self) -> Result<(), CacheError>;

    fn backend_name(&self) -> &'static str;
}
