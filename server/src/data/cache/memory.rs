//! In-process cache on moka
//!
//! Each entry carries its own TTL; moka evicts it once that elapses.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;

use super::backend::CacheBackend;
use super::error::CacheError;

#[derive(Clone)]
struct Entry {
    data: Vec<u8>,
    ttl: Duration,
    written_at: Instant,
}

impl Entry {
    fn remaining(&self) -> Option<Duration> {
        self.ttl
            .checked_sub(self.written_at.elapsed())
            .filter(|left| !left.is_zero())
    }
}

/// Expiry policy: a write starts a fresh TTL, reads leave it untouched
struct WriteTtl;

impl Expiry<String, Entry> for WriteTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _at: Instant,
        _left: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

pub struct InMemoryCache {
    entries: Cache<String, Entry>,
}

impl InMemoryCache {
    /// Create a cache holding at most `max_entries` keys
    pub fn new(max_entries: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(WriteTtl)
            .build();
        Self { entries }
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        // moka may hand back an entry whose TTL passed before eviction ran
        Ok(self
            .entries
            .get(key)
            .await
            .filter(|entry| entry.remaining().is_some())
            .map(|entry| entry.data))
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let entry = Entry {
            data: value,
            ttl,
            written_at: Instant::now(),
        };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        Ok(self.entries.get(key).await.and_then(|entry| entry.remaining()))
    }

    async fn health_check(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
