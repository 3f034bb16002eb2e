use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::config::{BackendKind, StoreBackend};
use super::constants::{
    ENV_BATCH_SIZE, ENV_BLOCK_MS, ENV_CACHE_BACKEND, ENV_CACHE_MAX_ENTRIES, ENV_CONFIG,
    ENV_CONSUMER_GROUP, ENV_CONSUMER_NAME, ENV_DEFAULT_PROJECT_ID, ENV_POSTGRES_URL,
    ENV_REDIS_URL, ENV_STORE_BACKEND, ENV_STREAM_NAME, ENV_TOPICS_BACKEND,
};

#[derive(Parser)]
#[command(name = "tracehouse")]
#[command(version, about = "Trace ingestion and aggregation service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    // Consumer options
    /// Stream to consume lifecycle events from
    #[arg(long, global = true, env = ENV_STREAM_NAME)]
    pub stream: Option<String>,

    /// Consumer group name (shared across instances)
    #[arg(long, global = true, env = ENV_CONSUMER_GROUP)]
    pub group: Option<String>,

    /// Consumer name (unique per instance, generated if omitted)
    #[arg(long, global = true, env = ENV_CONSUMER_NAME)]
    pub consumer_name: Option<String>,

    /// Maximum entries read per batch
    #[arg(long, global = true, env = ENV_BATCH_SIZE)]
    pub batch_size: Option<usize>,

    /// Blocking read timeout in milliseconds
    #[arg(long, global = true, env = ENV_BLOCK_MS)]
    pub block_ms: Option<u64>,

    /// Project assigned to traces without a project id
    #[arg(long, global = true, env = ENV_DEFAULT_PROJECT_ID)]
    pub default_project_id: Option<String>,

    // Storage options
    /// Relational store backend (memory or postgres)
    #[arg(long, global = true, env = ENV_STORE_BACKEND, value_parser = parse_store_backend)]
    pub store_backend: Option<StoreBackend>,

    /// PostgreSQL connection URL (when using postgres backend)
    #[arg(long, global = true, env = ENV_POSTGRES_URL)]
    pub postgres_url: Option<String>,

    // Cache and log options
    /// Cache backend (memory or redis)
    #[arg(long, global = true, env = ENV_CACHE_BACKEND, value_parser = parse_backend_kind)]
    pub cache_backend: Option<BackendKind>,

    /// Maximum number of in-memory cache entries
    #[arg(long, global = true, env = ENV_CACHE_MAX_ENTRIES)]
    pub cache_max_entries: Option<u64>,

    /// Durable log backend (memory or redis)
    #[arg(long, global = true, env = ENV_TOPICS_BACKEND, value_parser = parse_backend_kind)]
    pub topics_backend: Option<BackendKind>,

    /// Redis URL shared by the cache and the durable log
    #[arg(long, global = true, env = ENV_REDIS_URL)]
    pub redis_url: Option<String>,
}

/// Parse store backend from CLI/env string
fn parse_store_backend(s: &str) -> Result<StoreBackend, String> {
    match s.to_lowercase().as_str() {
        "memory" => Ok(StoreBackend::Memory),
        "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
        _ => Err(format!(
            "Invalid store backend '{}'. Valid options: memory, postgres",
            s
        )),
    }
}

/// Parse cache/log backend from CLI/env string
fn parse_backend_kind(s: &str) -> Result<BackendKind, String> {
    match s.to_lowercase().as_str() {
        "memory" => Ok(BackendKind::Memory),
        "redis" => Ok(BackendKind::Redis),
        _ => Err(format!(
            "Invalid backend '{}'. Valid options: memory, redis",
            s
        )),
    }
}

/// Parse a boolean flag value (true/false, on/off, 1/0)
fn parse_flag(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Ok(true),
        "false" | "off" | "0" | "no" => Ok(false),
        _ => Err(format!("Invalid flag '{}'. Valid options: true, false", s)),
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Run the stream consumer (default command)
    Start,
    /// Print the observation tree of a trace as JSON
    Tree {
        /// Trace id
        trace_id: String,
    },
    /// Print the visualization graph of a trace as JSON
    Graph {
        /// Trace id
        trace_id: String,
    },
    /// Calculate the cost of an LLM call from configured pricing
    Cost {
        /// Project whose pricing applies
        #[arg(long)]
        project: String,
        /// Model identifier (e.g. gpt-4-turbo)
        #[arg(long)]
        model: String,
        /// Prompt token count
        #[arg(long, allow_negative_numbers = true)]
        prompt_tokens: i64,
        /// Completion token count
        #[arg(long, allow_negative_numbers = true)]
        completion_tokens: i64,
    },
    /// Inspect or change per-project tracing
    Tracing {
        #[command(subcommand)]
        command: TracingCommands,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum TracingCommands {
    /// Show whether tracing is enabled for a project
    Status {
        /// Project id
        project: String,
    },
    /// Enable or disable tracing for a project
    Set {
        /// Project id
        project: String,
        /// New value (true/false)
        #[arg(value_parser = parse_flag, action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub config: Option<PathBuf>,
    pub stream: Option<String>,
    pub group: Option<String>,
    pub consumer_name: Option<String>,
    pub batch_size: Option<usize>,
    pub block_ms: Option<u64>,
    pub default_project_id: Option<String>,
    pub store_backend: Option<StoreBackend>,
    pub postgres_url: Option<String>,
    pub cache_backend: Option<BackendKind>,
    pub cache_max_entries: Option<u64>,
    pub topics_backend: Option<BackendKind>,
    pub redis_url: Option<String>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        config: cli.config,
        stream: cli.stream,
        group: cli.group,
        consumer_name: cli.consumer_name,
        batch_size: cli.batch_size,
        block_ms: cli.block_ms,
        default_project_id: cli.default_project_id,
        store_backend: cli.store_backend,
        postgres_url: cli.postgres_url,
        cache_backend: cli.cache_backend,
        cache_max_entries: cli.cache_max_entries,
        topics_backend: cli.topics_backend,
        redis_url: cli.redis_url,
    };
    (config, cli.command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_store_backend() {
        assert_eq!(parse_store_backend("memory"), Ok(StoreBackend::Memory));
        assert_eq!(parse_store_backend("PostgreSQL"), Ok(StoreBackend::Postgres));
        assert!(parse_store_backend("sqlite").is_err());
    }

    #[test]
    fn test_parse_backend_kind() {
        assert_eq!(parse_backend_kind("Redis"), Ok(BackendKind::Redis));
        assert!(parse_backend_kind("kafka").is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("off"), Ok(false));
        assert_eq!(parse_flag("TRUE"), Ok(true));
        assert!(parse_flag("maybe").is_err());
    }

    #[test]
    fn test_cli_parses_cost_command() {
        let cli = Cli::try_parse_from([
            "tracehouse",
            "cost",
            "--project",
            "p1",
            "--model",
            "gpt-4-turbo",
            "--prompt-tokens",
            "150",
            "--completion-tokens",
            "50",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Cost {
                prompt_tokens,
                completion_tokens,
                ..
            }) => {
                assert_eq!(prompt_tokens, 150);
                assert_eq!(completion_tokens, 50);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parses_tracing_set() {
        let cli = Cli::try_parse_from(["tracehouse", "tracing", "set", "p1", "false"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Tracing {
                command: TracingCommands::Set { enabled: false, .. }
            })
        ));
    }
}
