//! Redis-backed cache (Redis, Sentinel, Valkey, Dragonfly)

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use deadpool_redis::redis::{AsyncCommands, cmd};

use super::backend::CacheBackend;
use super::error::CacheError;
use crate::data::redis::{RedisBackendType, connect_pool};

pub struct RedisCache {
    pool: Pool,
    backend_type: RedisBackendType,
}

impl RedisCache {
    pub async fn new(redis_url: &str) -> Result<Self, CacheError> {
        let (pool, backend_type) = connect_pool(redis_url)
            .await
            .map_err(CacheError::Connection)?;
        Ok(Self { pool, backend_type })
    }
}

/// PSETEX rejects zero, so sub-millisecond TTLs round up to 1ms
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Map a PTTL reply: -2 is a missing key, -1 a key without expiry
fn remaining_from_pttl(pttl: i64) -> Option<Duration> {
    u64::try_from(pttl)
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.pool.get().await?;
        Ok(conn.get(key).await?)
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        let _: () = cmd("PSETEX")
            .arg(key)
            .arg(ttl_millis(ttl))
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let mut conn = self.pool.get().await?;
        let pttl: i64 = cmd("PTTL").arg(key).query_async(&mut conn).await?;
        Ok(remaining_from_pttl(pttl))
    }

    async fn health_check(&self) -> Result<(), CacheError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        self.backend_type.name()
    }
}
