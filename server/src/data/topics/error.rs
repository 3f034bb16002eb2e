//! Topic error types

use std::fmt;

/// Error type for durable log operations
#[derive(Debug)]
pub enum TopicError {
    /// Connection error (Redis)
    Connection(String),
    /// Stream operation error
    Stream(String),
    /// Consumer group could not be created
    ConsumerGroup(String),
    /// Consumer group does not exist (deleted or stream recreated)
    NoGroup(String),
    /// Configuration error
    Config(String),
}

impl std::error::Error for TopicError {}

impl fmt::Display for TopicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicError::Connection(msg) => write!(f, "connection error: {}", msg),
            TopicError::Stream(msg) => write!(f, "stream error: {}", msg),
            TopicError::ConsumerGroup(msg) => write!(f, "consumer group error: {}", msg),
            TopicError::NoGroup(group) => write!(f, "consumer group '{}' does not exist", group),
            TopicError::Config(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl From<deadpool_redis::PoolError> for TopicError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        TopicError::Connection(err.to_string())
    }
}

impl From<deadpool_redis::redis::RedisError> for TopicError {
    fn from(err: deadpool_redis::redis::RedisError) -> Self {
        TopicError::Stream(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            TopicError::NoGroup("workers".into()).to_string(),
            "consumer group 'workers' does not exist"
        );
        assert_eq!(
            TopicError::Connection("refused".into()).to_string(),
            "connection error: refused"
        );
    }
}
