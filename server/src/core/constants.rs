// =============================================================================
// Application Identity
// =============================================================================

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "tracehouse";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".tracehouse";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "tracehouse.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "TRACEHOUSE_CONFIG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "TRACEHOUSE_LOG";

// =============================================================================
// Environment Variables - Consumer
// =============================================================================

pub const ENV_STREAM_NAME: &str = "TRACEHOUSE_STREAM_NAME";
pub const ENV_CONSUMER_GROUP: &str = "TRACEHOUSE_CONSUMER_GROUP";
pub const ENV_CONSUMER_NAME: &str = "TRACEHOUSE_CONSUMER_NAME";
pub const ENV_BATCH_SIZE: &str = "TRACEHOUSE_BATCH_SIZE";
pub const ENV_BLOCK_MS: &str = "TRACEHOUSE_BLOCK_MS";
pub const ENV_DEFAULT_PROJECT_ID: &str = "TRACEHOUSE_DEFAULT_PROJECT_ID";

// =============================================================================
// Consumer Defaults
// =============================================================================

/// Stream the instrumentation SDK publishes lifecycle events to
pub const DEFAULT_STREAM_NAME: &str = "observability:events";

/// Consumer group shared by all consumer instances
pub const DEFAULT_CONSUMER_GROUP: &str = "tracehouse_consumers";

/// Maximum entries pulled per XREADGROUP
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// XREADGROUP block timeout in milliseconds (bounds shutdown latency)
pub const DEFAULT_BLOCK_MS: u64 = 1000;

/// Project assigned to traces published without a project id
pub const DEFAULT_PROJECT_ID: &str = "default";

/// Back-off after a failed stream read
pub const READ_ERROR_BACKOFF_MS: u64 = 1000;

/// Interval for claiming stuck entries (seconds)
pub const CLAIM_INTERVAL_SECS: u64 = 30;

/// Minimum idle time before an unacknowledged entry is claimed (milliseconds)
pub const CLAIM_MIN_IDLE_MS: u64 = 60_000;

/// Maximum number of entries to claim at once
pub const CLAIM_MAX_COUNT: usize = 100;

// =============================================================================
// Liveness
// =============================================================================

/// Well-known key whose presence signals a live consumer
pub const HEARTBEAT_KEY: &str = "tracehouse:consumer:heartbeat";

/// Heartbeat refresh interval
pub const HEARTBEAT_INTERVAL_SECS: u64 = 5;

/// Heartbeat key expiry (three missed refreshes)
pub const HEARTBEAT_TTL_SECS: u64 = 15;

// =============================================================================
// Tracing Flag Cache
// =============================================================================

/// TTL of cached per-project tracing flags
pub const CACHE_TTL_TRACING_FLAG: u64 = 300;

// =============================================================================
// Environment Variables - Storage
// =============================================================================

pub const ENV_STORE_BACKEND: &str = "TRACEHOUSE_STORE_BACKEND";
pub const ENV_POSTGRES_URL: &str = "TRACEHOUSE_POSTGRES_URL";

// =============================================================================
// PostgreSQL Defaults
// =============================================================================

pub const POSTGRES_DEFAULT_MAX_CONNECTIONS: u32 = 20;
pub const POSTGRES_DEFAULT_MIN_CONNECTIONS: u32 = 2;
pub const POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
pub const POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const POSTGRES_DEFAULT_MAX_LIFETIME_SECS: u64 = 1800;
pub const POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 60;

/// Interval between pool health probes
pub const POSTGRES_HEALTH_CHECK_INTERVAL_SECS: u64 = 60;

// =============================================================================
// Environment Variables - Cache / Topics
// =============================================================================

pub const ENV_CACHE_BACKEND: &str = "TRACEHOUSE_CACHE_BACKEND";
pub const ENV_CACHE_MAX_ENTRIES: &str = "TRACEHOUSE_CACHE_MAX_ENTRIES";
pub const ENV_REDIS_URL: &str = "TRACEHOUSE_REDIS_URL";
pub const ENV_TOPICS_BACKEND: &str = "TRACEHOUSE_TOPICS_BACKEND";

/// Default maximum entries for the in-memory cache
pub const DEFAULT_CACHE_MAX_ENTRIES: u64 = 100_000;

// =============================================================================
// Shutdown
// =============================================================================

/// Maximum time to wait for background tasks during shutdown
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;
