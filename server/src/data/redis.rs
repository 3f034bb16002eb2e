//! Shared Redis connection setup
//!
//! The cache and the durable log each own a pool created here.
//!
//! # URL Formats
//!
//! Standard Redis/Valkey/Dragonfly:
//! ```text
//! redis://[user:password@]host:port[/db]
//! rediss://[user:password@]host:port[/db]  (TLS)
//! ```
//!
//! Redis Sentinel:
//! ```text
//! redis+sentinel://[user:password@]sentinel1:port,sentinel2:port/master_name[/db]
//! ```

use std::time::Duration;

use deadpool_redis::{Config, Pool, Runtime};

use crate::utils::url::mask_password;

/// Type of Redis-compatible backend being used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedisBackendType {
    /// Standard Redis or compatible (Valkey, Dragonfly)
    Redis,
    /// Redis Sentinel for high availability
    Sentinel,
}

impl RedisBackendType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::Sentinel => "redis-sentinel",
        }
    }
}

/// Create a pool and validate it with PING
///
/// Errors are returned as messages with the password masked.
pub async fn connect_pool(redis_url: &str) -> Result<(Pool, RedisBackendType), String> {
    let sanitized_url = mask_password(redis_url);
    let backend_type = detect_backend_type(redis_url);

    let mut config = Config::from_url(redis_url);
    config.pool = Some(deadpool_redis::PoolConfig {
        max_size: 32,
        timeouts: deadpool_redis::Timeouts {
            wait: Some(Duration::from_secs(5)),
            create: Some(Duration::from_secs(5)),
            recycle: Some(Duration::from_secs(5)),
        },
        ..Default::default()
    });
    let pool = config.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
        let hint = match backend_type {
            RedisBackendType::Sentinel => {
                " (Sentinel URL format: redis+sentinel://host1:port,host2:port/master_name/db)"
            }
            RedisBackendType::Redis => "",
        };
        format!("Failed to create Redis pool for {sanitized_url}: {e}{hint}")
    })?;

    let mut conn = pool.get().await.map_err(|e| {
        format!("Failed to get Redis connection from pool for {sanitized_url}: {e}")
    })?;

    deadpool_redis::redis::cmd("PING")
        .query_async::<String>(&mut conn)
        .await
        .map_err(|e| format!("Redis PING failed for {sanitized_url}: {e}"))?;

    tracing::debug!(url = %sanitized_url, backend = backend_type.name(), "Redis connected");
    Ok((pool, backend_type))
}

/// Detect the backend type from URL scheme
pub fn detect_backend_type(url: &str) -> RedisBackendType {
    if url.starts_with("redis+sentinel://") || url.starts_with("rediss+sentinel://") {
        RedisBackendType::Sentinel
    } else {
        RedisBackendType::Redis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_backend_type() {
        assert_eq!(
            detect_backend_type("rediss://localhost:6379"),
            RedisBackendType::Redis
        );
        assert_eq!(
            detect_backend_type("redis+sentinel://s1:26379/master"),
            RedisBackendType::Sentinel
        );
        assert_eq!(RedisBackendType::Sentinel.name(), "redis-sentinel");
    }
}
