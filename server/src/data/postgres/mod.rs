//! PostgreSQL store service
//!
//! Production backend for traces, observations, pricing and projects.
//! Schema definitions and versioned migrations live in this module.

pub mod error;
mod migrations;
mod repository;
pub mod schema;

pub use error::PostgresError;

use std::sync::Arc;
use std::time::Duration;

use sqlx::{ConnectOptions, PgPool};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::log::LevelFilter;

use crate::core::config::PostgresConfig;
use crate::core::constants::{
    POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS, POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS,
    POSTGRES_DEFAULT_MAX_CONNECTIONS, POSTGRES_DEFAULT_MAX_LIFETIME_SECS,
    POSTGRES_DEFAULT_MIN_CONNECTIONS, POSTGRES_HEALTH_CHECK_INTERVAL_SECS,
};
use crate::utils::url::mask_password;

/// Pool settings with zero values replaced by defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PoolSettings {
    max_connections: u32,
    min_connections: u32,
    acquire_timeout: Duration,
    idle_timeout: Duration,
    max_lifetime: Duration,
    /// `None` disables the per-connection statement timeout
    statement_timeout_secs: Option<u64>,
}

fn or_default<T: Default + PartialEq>(value: T, default: T) -> T {
    if value == T::default() { default } else { value }
}

impl PoolSettings {
    fn resolve(config: &PostgresConfig) -> Self {
        let secs = |value: u64, default: u64| Duration::from_secs(or_default(value, default));
        Self {
            max_connections: or_default(config.max_connections, POSTGRES_DEFAULT_MAX_CONNECTIONS),
            min_connections: or_default(config.min_connections, POSTGRES_DEFAULT_MIN_CONNECTIONS)
                .min(or_default(config.max_connections, POSTGRES_DEFAULT_MAX_CONNECTIONS)),
            acquire_timeout: secs(config.acquire_timeout_secs, POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: secs(config.idle_timeout_secs, POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS),
            max_lifetime: secs(config.max_lifetime_secs, POSTGRES_DEFAULT_MAX_LIFETIME_SECS),
            statement_timeout_secs: Some(config.statement_timeout_secs).filter(|s| *s > 0),
        }
    }
}

/// PostgreSQL store service
///
/// Owns the pool used for traces, observations, pricing and projects.
/// Created once at startup and shared through `StoreService`.
pub struct PostgresService {
    pool: PgPool,
}

impl PostgresService {
    /// Connect, apply pending migrations and seed default pricing
    pub async fn init(config: &PostgresConfig) -> Result<Self, PostgresError> {
        if config.url.is_empty() {
            return Err(PostgresError::Config("PostgreSQL URL is required".into()));
        }
        let masked_url = mask_password(&config.url);

        let mut options: PgConnectOptions = config
            .url
            .parse()
            .map_err(|e| PostgresError::Config(format!("Invalid PostgreSQL URL {masked_url}: {e}")))?;
        options = options.log_statements(LevelFilter::Trace);

        let settings = PoolSettings::resolve(config);
        if let Some(secs) = settings.statement_timeout_secs {
            options = options.options([("statement_timeout", format!("{secs}s"))]);
        }

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.acquire_timeout)
            .idle_timeout(settings.idle_timeout)
            .max_lifetime(settings.max_lifetime)
            .connect_with(options)
            .await
            .map_err(|source| {
                tracing::warn!(url = %masked_url, error = %source, "PostgreSQL connection failed");
                PostgresError::Connect {
                    url: masked_url.clone(),
                    source,
                }
            })?;

        migrations::run_migrations(&pool).await?;

        tracing::debug!(url = %masked_url, settings = ?settings, "PostgreSQL store ready");
        Ok(Self { pool })
    }

    /// Close the connection pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("PostgreSQL pool closed");
    }

    /// Probe the pool every minute until shutdown
    ///
    /// Failures are logged once per outage and recovery is logged at info.
    pub fn start_health_check_task(
        self: &Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let db = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(POSTGRES_HEALTH_CHECK_INTERVAL_SECS));
            let mut failures: u32 = 0;
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("PostgreSQL health check task shutting down");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match sqlx::query("SELECT 1").execute(&db.pool).await {
                            Ok(_) if failures > 0 => {
                                tracing::info!(failed_probes = failures, "PostgreSQL reachable again");
                                failures = 0;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                failures = failures.saturating_add(1);
                                if failures == 1 {
                                    tracing::warn!(error = %e, "PostgreSQL health check failed");
                                }
                            }
                        }
                    }
                }
            }
        })
    }
}
