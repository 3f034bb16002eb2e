//! Cache error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache configuration error: {0}")]
    Config(String),

    #[error("Cache unreachable: {0}")]
    Connection(String),

    #[error("Cached value is not valid JSON: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Redis command failed: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    #[error("Redis pool exhausted or closed: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_from_json() {
        let json_err = serde_json::from_slice::<serde_json::Value>(b"{not json").unwrap_err();
        let err: CacheError = json_err.into();
        assert!(matches!(err, CacheError::Codec(_)));
        assert!(err.to_string().starts_with("Cached value is not valid JSON:"));
    }

    #[test]
    fn test_connection_error_display() {
        let err = CacheError::Connection("redis://:***@cache:6379 refused".to_string());
        assert_eq!(
            err.to_string(),
            "Cache unreachable: redis://:***@cache:6379 refused"
        );
    }
}
