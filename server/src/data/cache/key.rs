//! Cache key builder
//!
//! Keys are part of the external contract (other services read the
//! heartbeat and tracing flags), so they carry no version prefix.

use crate::core::constants::HEARTBEAT_KEY;

pub struct CacheKey;

impl CacheKey {
    /// Per-project tracing flag: `tracing:{project_id}:enabled`
    pub fn tracing_enabled(project_id: &str) -> String {
        format!("tracing:{}:enabled", project_id)
    }

    /// Consumer liveness key
    pub fn consumer_heartbeat() -> &'static str {
        HEARTBEAT_KEY
    }
}
