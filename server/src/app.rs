//! Core application

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::core::cli::{self, CliConfig, Commands, TracingCommands};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::data::StoreService;
use crate::data::cache::CacheService;
use crate::data::topics::TopicService;
use crate::domain::ingest::{EventHandlers, LivenessPublisher, StreamConsumer};
use crate::domain::pricing::CostCalculator;
use crate::domain::projects::TracingFlagCache;
use crate::domain::traces::TreeService;
use crate::utils::retry::{DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, retry_with_backoff_async};

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub store: Arc<StoreService>,
    pub cache: Arc<CacheService>,
    pub topics: Arc<TopicService>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        match command {
            Some(Commands::Start) | None => {
                let app = Self::init(&cli_config).await?;
                app.start_consumer().await
            }
            Some(Commands::Tree { trace_id }) => {
                let config = AppConfig::load(&cli_config)?;
                let store = connect_store(&config).await?;
                let tree = TreeService::new(store.repository())
                    .trace_tree(&trace_id)
                    .await
                    .with_context(|| format!("Failed to load trace {trace_id}"))?;
                print_json(&tree)?;
                store.close().await;
                Ok(())
            }
            Some(Commands::Graph { trace_id }) => {
                let config = AppConfig::load(&cli_config)?;
                let store = connect_store(&config).await?;
                let graph = TreeService::new(store.repository())
                    .trace_graph(&trace_id)
                    .await
                    .with_context(|| format!("Failed to load trace {trace_id}"))?;
                print_json(&graph)?;
                store.close().await;
                Ok(())
            }
            Some(Commands::Cost {
                project,
                model,
                prompt_tokens,
                completion_tokens,
            }) => {
                let config = AppConfig::load(&cli_config)?;
                let store = connect_store(&config).await?;
                let cost = CostCalculator::new(store.repository())
                    .calculate(&project, &model, prompt_tokens, completion_tokens)
                    .await?;
                print_json(&cost)?;
                store.close().await;
                Ok(())
            }
            Some(Commands::Tracing { command }) => {
                let config = AppConfig::load(&cli_config)?;
                Self::handle_tracing_command(&config, command).await
            }
        }
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;

        let store = connect_store(&config).await?;
        tracing::debug!(backend = %store.backend(), "Store initialized");

        let cache = Arc::new(connect_cache(&config).await?);
        tracing::debug!(backend = cache.backend_name(), "Cache initialized");

        let topics = Arc::new(
            retry_with_backoff_async(
                "log connection",
                DEFAULT_MAX_ATTEMPTS,
                DEFAULT_BASE_DELAY_MS,
                || TopicService::new(&config.topics),
            )
            .await
            .context("Failed to initialize topic service")?,
        );
        tracing::debug!(backend = topics.backend_name(), "Topics initialized");

        let shutdown = ShutdownService::new(store.clone());

        Ok(Self {
            shutdown,
            config,
            store,
            cache,
            topics,
        })
    }

    async fn handle_tracing_command(config: &AppConfig, command: TracingCommands) -> Result<()> {
        let store = connect_store(config).await?;
        let cache = Arc::new(connect_cache(config).await?);
        let flags = TracingFlagCache::new(cache, store.repository());

        match command {
            TracingCommands::Status { project } => {
                let enabled = flags.is_enabled(&project).await;
                println!("{enabled}");
            }
            TracingCommands::Set { project, enabled } => {
                let found = store
                    .repository()
                    .set_project_tracing_enabled(&project, enabled)
                    .await
                    .with_context(|| format!("Failed to update project {project}"))?;
                if found {
                    flags.invalidate(&project, enabled).await;
                    println!("{project}: tracing {}", if enabled { "enabled" } else { "disabled" });
                } else {
                    println!("{project}: not found");
                }
            }
        }

        store.close().await;
        Ok(())
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start_consumer(self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        self.shutdown.install_signal_handlers();

        self.start_background_tasks().await;

        tracing::info!(
            stream = %self.config.consumer.stream,
            group = %self.config.consumer.group,
            consumer = %self.config.consumer.consumer_name,
            store = %self.store.backend(),
            topics = self.topics.backend_name(),
            cache = self.cache.backend_name(),
            "tracehouse consumer running"
        );

        self.shutdown.wait().await;
        self.shutdown.shutdown().await;

        Ok(())
    }

    pub async fn start_background_tasks(&self) {
        if let Some(h) = self
            .store
            .start_health_check_task(self.shutdown.subscribe())
        {
            self.shutdown.register(h).await;
        }

        let repository = self.store.repository();
        let handlers = EventHandlers::new(
            repository.clone(),
            CostCalculator::new(repository.clone()),
            self.config.consumer.default_project_id.clone(),
        );
        let consumer = StreamConsumer::new(
            self.topics.backend(),
            repository,
            handlers,
            self.config.consumer.clone(),
        );

        let liveness = LivenessPublisher::new(
            self.cache.clone(),
            self.topics.backend(),
            self.config.consumer.stream.clone(),
            self.config.consumer.consumer_name.clone(),
            self.config.consumer.group.clone(),
            consumer.events_processed_counter(),
        );
        self.shutdown
            .register(liveness.start(self.shutdown.subscribe()))
            .await;

        // A consumer that exits on its own (e.g. it never reached the log)
        // takes the process down with it
        let consumer_task = consumer.start(self.shutdown.subscribe());
        let shutdown = self.shutdown.clone();
        let supervisor = tokio::spawn(async move {
            if let Err(e) = consumer_task.await {
                tracing::error!(error = %e, "Consumer task panicked");
            }
            if !shutdown.is_triggered() {
                tracing::error!("Consumer stopped unexpectedly, shutting down");
                shutdown.trigger();
            }
        });
        self.shutdown.register(supervisor).await;

        tracing::debug!("Background tasks started");
    }
}

/// Connect the relational store, retrying transient failures
async fn connect_store(config: &AppConfig) -> Result<Arc<StoreService>> {
    let store = retry_with_backoff_async(
        "store connection",
        DEFAULT_MAX_ATTEMPTS,
        DEFAULT_BASE_DELAY_MS,
        || StoreService::init(&config.database),
    )
    .await
    .context("Failed to initialize store")?;
    Ok(Arc::new(store))
}

async fn connect_cache(config: &AppConfig) -> Result<CacheService> {
    retry_with_backoff_async(
        "cache connection",
        DEFAULT_MAX_ATTEMPTS,
        DEFAULT_BASE_DELAY_MS,
        || CacheService::new(&config.cache),
    )
    .await
    .context("Failed to initialize cache service")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{json}");
    Ok(())
}
