use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_BATCH_SIZE, DEFAULT_BLOCK_MS,
    DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CONSUMER_GROUP, DEFAULT_PROJECT_ID, DEFAULT_STREAM_NAME,
    POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS, POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS,
    POSTGRES_DEFAULT_MAX_CONNECTIONS, POSTGRES_DEFAULT_MAX_LIFETIME_SECS,
    POSTGRES_DEFAULT_MIN_CONNECTIONS, POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS,
};

// =============================================================================
// Store Backend Enum
// =============================================================================

/// Relational store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store (development, tests)
    #[default]
    Memory,
    /// PostgreSQL (production)
    Postgres,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => write!(f, "memory"),
            StoreBackend::Postgres => write!(f, "postgres"),
        }
    }
}

// =============================================================================
// Cache / Log Backend Enum
// =============================================================================

/// Backend for the key/value cache and the durable log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Redis,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Redis => write!(f, "redis"),
        }
    }
}

// =============================================================================
// File Config Structs (all fields optional)
// =============================================================================

/// Consumer configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ConsumerFileConfig {
    pub stream: Option<String>,
    pub group: Option<String>,
    pub consumer_name: Option<String>,
    pub batch_size: Option<usize>,
    pub block_ms: Option<u64>,
    pub default_project_id: Option<String>,
}

/// PostgreSQL configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PostgresFileConfig {
    /// PostgreSQL connection URL (or use TRACEHOUSE_POSTGRES_URL env var)
    pub url: Option<String>,
    /// Maximum number of connections in the pool (default: 20)
    pub max_connections: Option<u32>,
    /// Minimum number of connections to keep warm (default: 2)
    pub min_connections: Option<u32>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Idle connection timeout in seconds (default: 600)
    pub idle_timeout_secs: Option<u64>,
    /// Max connection lifetime in seconds (default: 1800)
    pub max_lifetime_secs: Option<u64>,
    /// Statement timeout in seconds, 0 to disable (default: 60)
    pub statement_timeout_secs: Option<u64>,
}

/// Database configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DatabaseFileConfig {
    /// Store backend: memory (default) or postgres
    pub backend: Option<StoreBackend>,
    pub postgres: Option<PostgresFileConfig>,
}

/// Cache configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CacheFileConfig {
    pub backend: Option<BackendKind>,
    pub max_entries: Option<u64>,
    pub redis_url: Option<String>,
}

/// Durable log configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TopicsFileConfig {
    pub backend: Option<BackendKind>,
    pub redis_url: Option<String>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub consumer: Option<ConsumerFileConfig>,
    pub database: Option<DatabaseFileConfig>,
    pub cache: Option<CacheFileConfig>,
    pub topics: Option<TopicsFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// Overwrite `target` when `source` carries a value
fn take<T>(target: &mut Option<T>, source: Option<T>) {
    if source.is_some() {
        *target = source;
    }
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(consumer) = other.consumer {
            let current = self.consumer.get_or_insert_with(Default::default);
            take(&mut current.stream, consumer.stream);
            take(&mut current.group, consumer.group);
            take(&mut current.consumer_name, consumer.consumer_name);
            take(&mut current.batch_size, consumer.batch_size);
            take(&mut current.block_ms, consumer.block_ms);
            take(&mut current.default_project_id, consumer.default_project_id);
        }

        if let Some(database) = other.database {
            let current = self.database.get_or_insert_with(Default::default);
            take(&mut current.backend, database.backend);
            if let Some(pg) = database.postgres {
                let cur = current.postgres.get_or_insert_with(Default::default);
                take(&mut cur.url, pg.url);
                take(&mut cur.max_connections, pg.max_connections);
                take(&mut cur.min_connections, pg.min_connections);
                take(&mut cur.acquire_timeout_secs, pg.acquire_timeout_secs);
                take(&mut cur.idle_timeout_secs, pg.idle_timeout_secs);
                take(&mut cur.max_lifetime_secs, pg.max_lifetime_secs);
                take(&mut cur.statement_timeout_secs, pg.statement_timeout_secs);
            }
        }

        if let Some(cache) = other.cache {
            let current = self.cache.get_or_insert_with(Default::default);
            take(&mut current.backend, cache.backend);
            take(&mut current.max_entries, cache.max_entries);
            take(&mut current.redis_url, cache.redis_url);
        }

        if let Some(topics) = other.topics {
            let current = self.topics.get_or_insert_with(Default::default);
            take(&mut current.backend, topics.backend);
            take(&mut current.redis_url, topics.redis_url);
        }

        if let (serde_json::Value::Object(mine), serde_json::Value::Object(theirs)) =
            (&mut self.extra, other.extra.clone())
        {
            mine.extend(theirs);
        } else if self.extra.is_null() {
            self.extra = other.extra;
        }
    }
}

// =============================================================================
// Runtime Config Structs (final merged configuration)
// =============================================================================

/// Stream consumer configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub stream: String,
    pub group: String,
    pub consumer_name: String,
    pub batch_size: usize,
    pub block_ms: u64,
    pub default_project_id: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            stream: DEFAULT_STREAM_NAME.to_string(),
            group: DEFAULT_CONSUMER_GROUP.to_string(),
            consumer_name: generate_consumer_name(),
            batch_size: DEFAULT_BATCH_SIZE,
            block_ms: DEFAULT_BLOCK_MS,
            default_project_id: DEFAULT_PROJECT_ID.to_string(),
        }
    }
}

/// PostgreSQL configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections to keep warm
    pub min_connections: u32,
    /// Connection acquire timeout in seconds
    pub acquire_timeout_secs: u64,
    /// Idle connection timeout in seconds
    pub idle_timeout_secs: u64,
    /// Max connection lifetime in seconds
    pub max_lifetime_secs: u64,
    /// Statement timeout in seconds (0 = disabled)
    pub statement_timeout_secs: u64,
}

/// Database configuration (final/runtime)
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    /// Only populated when backend = postgres
    pub postgres: Option<PostgresConfig>,
}

/// Cache configuration (used internally by CacheService)
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub backend: BackendKind,
    /// Maximum entries (memory backend)
    pub max_entries: u64,
    /// Redis URL (redis backend)
    pub redis_url: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            redis_url: None,
        }
    }
}

/// Durable log configuration (used internally by TopicService)
#[derive(Debug, Clone, Default)]
pub struct TopicsConfig {
    pub backend: BackendKind,
    pub redis_url: Option<String>,
}

/// Final merged application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub consumer: ConsumerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub topics: TopicsConfig,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.tracehouse/tracehouse.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_home(path);
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        let config = Self::from_sources(cli, file_config);
        config.validate()?;

        tracing::debug!(
            stream = %config.consumer.stream,
            group = %config.consumer.group,
            consumer = %config.consumer.consumer_name,
            batch_size = config.consumer.batch_size,
            block_ms = config.consumer.block_ms,
            store_backend = %config.database.backend,
            cache_backend = %config.cache.backend,
            topics_backend = %config.topics.backend,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Layer configs: defaults -> file config -> CLI/env overrides
    fn from_sources(cli: &CliConfig, file_config: FileConfig) -> Self {
        let file_consumer = file_config.consumer.unwrap_or_default();
        let file_database = file_config.database.unwrap_or_default();
        let file_cache = file_config.cache.unwrap_or_default();
        let file_topics = file_config.topics.unwrap_or_default();

        let consumer = ConsumerConfig {
            stream: cli
                .stream
                .clone()
                .or(file_consumer.stream)
                .unwrap_or_else(|| DEFAULT_STREAM_NAME.to_string()),
            group: cli
                .group
                .clone()
                .or(file_consumer.group)
                .unwrap_or_else(|| DEFAULT_CONSUMER_GROUP.to_string()),
            consumer_name: cli
                .consumer_name
                .clone()
                .or(file_consumer.consumer_name)
                .unwrap_or_else(generate_consumer_name),
            batch_size: cli
                .batch_size
                .or(file_consumer.batch_size)
                .unwrap_or(DEFAULT_BATCH_SIZE),
            block_ms: cli
                .block_ms
                .or(file_consumer.block_ms)
                .unwrap_or(DEFAULT_BLOCK_MS),
            default_project_id: cli
                .default_project_id
                .clone()
                .or(file_consumer.default_project_id)
                .unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string()),
        };

        let store_backend = cli
            .store_backend
            .or(file_database.backend)
            .unwrap_or_default();

        // PostgreSQL config (only populated if using postgres backend)
        let postgres = if store_backend == StoreBackend::Postgres {
            let file_pg = file_database.postgres.unwrap_or_default();
            Some(PostgresConfig {
                url: cli.postgres_url.clone().or(file_pg.url).unwrap_or_default(),
                max_connections: file_pg
                    .max_connections
                    .unwrap_or(POSTGRES_DEFAULT_MAX_CONNECTIONS),
                min_connections: file_pg
                    .min_connections
                    .unwrap_or(POSTGRES_DEFAULT_MIN_CONNECTIONS),
                acquire_timeout_secs: file_pg
                    .acquire_timeout_secs
                    .unwrap_or(POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS),
                idle_timeout_secs: file_pg
                    .idle_timeout_secs
                    .unwrap_or(POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS),
                max_lifetime_secs: file_pg
                    .max_lifetime_secs
                    .unwrap_or(POSTGRES_DEFAULT_MAX_LIFETIME_SECS),
                statement_timeout_secs: file_pg
                    .statement_timeout_secs
                    .unwrap_or(POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS),
            })
        } else {
            None
        };

        // A single --redis-url serves both the cache and the log unless the
        // file sets them separately
        let cache_redis_url = cli.redis_url.clone().or(file_cache.redis_url);
        let cache = CacheConfig {
            backend: cli.cache_backend.or(file_cache.backend).unwrap_or_default(),
            max_entries: cli
                .cache_max_entries
                .or(file_cache.max_entries)
                .unwrap_or(DEFAULT_CACHE_MAX_ENTRIES),
            redis_url: cache_redis_url.clone(),
        };

        let topics = TopicsConfig {
            backend: cli
                .topics_backend
                .or(file_topics.backend)
                .unwrap_or_default(),
            redis_url: cli
                .redis_url
                .clone()
                .or(file_topics.redis_url)
                .or(cache_redis_url),
        };

        Self {
            consumer,
            database: DatabaseConfig {
                backend: store_backend,
                postgres,
            },
            cache,
            topics,
        }
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        if self.consumer.stream.is_empty() {
            anyhow::bail!("Configuration error: consumer.stream must not be empty");
        }
        if self.consumer.group.is_empty() {
            anyhow::bail!("Configuration error: consumer.group must not be empty");
        }
        if self.consumer.batch_size == 0 {
            anyhow::bail!("Configuration error: consumer.batch_size must be greater than 0");
        }
        if self.consumer.block_ms == 0 {
            anyhow::bail!("Configuration error: consumer.block_ms must be greater than 0");
        }

        if self.database.backend == StoreBackend::Postgres
            && self
                .database
                .postgres
                .as_ref()
                .is_none_or(|pg| pg.url.is_empty())
        {
            anyhow::bail!(
                "Configuration error: database.postgres.url is required when database.backend is 'postgres'"
            );
        }

        if self.cache.backend == BackendKind::Redis
            && self.cache.redis_url.as_deref().is_none_or(str::is_empty)
        {
            anyhow::bail!(
                "Configuration error: cache.redis_url is required when cache.backend is 'redis'"
            );
        }

        if self.topics.backend == BackendKind::Redis
            && self.topics.redis_url.as_deref().is_none_or(str::is_empty)
        {
            anyhow::bail!(
                "Configuration error: topics.redis_url is required when topics.backend is 'redis'"
            );
        }

        Ok(())
    }
}

/// Unique consumer name: {uuid}:{pid}
fn generate_consumer_name() -> String {
    format!("{}:{}", Uuid::new_v4(), std::process::id())
}

/// Get the profile config path (~/.tracehouse/tracehouse.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_backend_serde() {
        let backend: StoreBackend = serde_json::from_str(r#""postgres""#).unwrap();
        assert_eq!(backend, StoreBackend::Postgres);
        assert_eq!(StoreBackend::Memory.to_string(), "memory");
    }

    #[test]
    fn test_file_config_parse_full() {
        let json = r#"{
            "consumer": { "stream": "events", "group": "g1", "batch_size": 10, "block_ms": 500 },
            "database": { "backend": "postgres", "postgres": { "url": "postgres://localhost/th" } },
            "cache": { "backend": "redis", "redis_url": "redis://localhost:6379/0" }
        }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();

        let consumer = config.consumer.as_ref().unwrap();
        assert_eq!(consumer.stream.as_deref(), Some("events"));
        assert_eq!(consumer.batch_size, Some(10));
        let database = config.database.as_ref().unwrap();
        assert_eq!(database.backend, Some(StoreBackend::Postgres));
        assert_eq!(config.cache.as_ref().unwrap().backend, Some(BackendKind::Redis));
    }

    #[test]
    fn test_file_config_parse_extra_fields() {
        let json = r#"{ "consumer": { "group": "g" }, "unknown_field": 123 }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.extra.get("unknown_field").unwrap(), 123);
    }

    #[test]
    fn test_file_config_merge() {
        let mut base: FileConfig =
            serde_json::from_str(r#"{ "consumer": { "stream": "a", "batch_size": 5 } }"#).unwrap();
        let overlay: FileConfig =
            serde_json::from_str(r#"{ "consumer": { "stream": "b" }, "topics": { "backend": "redis" } }"#)
                .unwrap();
        base.merge(overlay);

        let consumer = base.consumer.unwrap();
        assert_eq!(consumer.stream.as_deref(), Some("b"));
        assert_eq!(consumer.batch_size, Some(5));
        assert_eq!(base.topics.unwrap().backend, Some(BackendKind::Redis));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, r#"{ "consumer": { "default_project_id": "proj-x" } }"#).unwrap();

        let config = FileConfig::load_from_file(&path).unwrap();
        assert_eq!(
            config.consumer.unwrap().default_project_id.as_deref(),
            Some("proj-x")
        );
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();
        assert!(FileConfig::load_from_file(&path).is_err());
    }

    #[test]
    fn test_app_config_defaults() {
        let config = AppConfig::from_sources(&CliConfig::default(), FileConfig::default());
        assert_eq!(config.consumer.stream, DEFAULT_STREAM_NAME);
        assert_eq!(config.consumer.group, DEFAULT_CONSUMER_GROUP);
        assert_eq!(config.consumer.batch_size, 50);
        assert_eq!(config.consumer.block_ms, 1000);
        assert_eq!(config.consumer.default_project_id, DEFAULT_PROJECT_ID);
        assert_eq!(config.database.backend, StoreBackend::Memory);
        assert!(config.database.postgres.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_config_cli_override() {
        let file: FileConfig =
            serde_json::from_str(r#"{ "consumer": { "batch_size": 5, "group": "file-group" } }"#)
                .unwrap();
        let cli = CliConfig {
            batch_size: Some(7),
            ..Default::default()
        };
        let config = AppConfig::from_sources(&cli, file);
        assert_eq!(config.consumer.batch_size, 7);
        assert_eq!(config.consumer.group, "file-group");
    }

    #[test]
    fn test_redis_url_shared_by_cache_and_topics() {
        let cli = CliConfig {
            cache_backend: Some(BackendKind::Redis),
            topics_backend: Some(BackendKind::Redis),
            redis_url: Some("redis://cache:6379/0".to_string()),
            ..Default::default()
        };
        let config = AppConfig::from_sources(&cli, FileConfig::default());
        assert_eq!(config.topics.redis_url.as_deref(), Some("redis://cache:6379/0"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let cli = CliConfig {
            batch_size: Some(0),
            ..Default::default()
        };
        let config = AppConfig::from_sources(&cli, FileConfig::default());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_postgres_url() {
        let cli = CliConfig {
            store_backend: Some(StoreBackend::Postgres),
            ..Default::default()
        };
        let config = AppConfig::from_sources(&cli, FileConfig::default());
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("database.postgres.url"));
    }

    #[test]
    fn test_validate_requires_redis_url() {
        let cli = CliConfig {
            topics_backend: Some(BackendKind::Redis),
            ..Default::default()
        };
        let config = AppConfig::from_sources(&cli, FileConfig::default());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_generated_consumer_names_are_unique() {
        assert_ne!(generate_consumer_name(), generate_consumer_name());
    }
}
