//! Stream consumer
//!
//! Reads lifecycle events from the durable log with a consumer group and
//! writes them to the relational store.
//!
//! ```text
//! Stopped ─▶ Connecting ─▶ GroupReady ─▶ Consuming ─▶ Stopping ─▶ Stopped
//! ```
//!
//! Each batch is sorted so traces are created before observations and
//! observations before their updates. Start events commit one by one; end
//! and error events share one batch transaction with a savepoint each.
//! Only entries whose writes committed are acknowledged; everything else is
//! redelivered through the periodic claim.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::error::IngestError;
use super::event::{EventKind, LifecycleEvent};
use super::handlers::EventHandlers;
use crate::core::config::ConsumerConfig;
use crate::core::constants::{
    CLAIM_INTERVAL_SECS, CLAIM_MAX_COUNT, CLAIM_MIN_IDLE_MS, READ_ERROR_BACKOFF_MS,
};
use crate::data::topics::{LogEntry, TopicBackend, TopicError};
use crate::data::traits::{IngestStore, IngestTx};
use crate::utils::retry::{DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, retry_with_backoff_async};

/// Lifecycle state of a consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Stopped,
    Connecting,
    GroupReady,
    Consuming,
    Stopping,
}

impl ConsumerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Connecting => "connecting",
            Self::GroupReady => "group_ready",
            Self::Consuming => "consuming",
            Self::Stopping => "stopping",
        }
    }
}

/// Recovery of entries left pending by failed events or crashed consumers
#[derive(Debug, Clone, Copy)]
pub struct ClaimSettings {
    pub interval: Duration,
    pub min_idle_ms: u64,
    pub max_count: usize,
}

impl Default for ClaimSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(CLAIM_INTERVAL_SECS),
            min_idle_ms: CLAIM_MIN_IDLE_MS,
            max_count: CLAIM_MAX_COUNT,
        }
    }
}

/// Counts for one processed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Events whose writes committed
    pub processed: usize,
    /// Events left unacknowledged for redelivery
    pub failed: usize,
    /// Unknown event types (acknowledged without writes)
    pub skipped: usize,
    /// Entries the log confirmed as acknowledged
    pub acked: u64,
}

/// Observer for a running consumer
#[derive(Clone)]
pub struct ConsumerHandle {
    state_rx: watch::Receiver<ConsumerState>,
    events_processed: Arc<AtomicU64>,
}

impl ConsumerHandle {
    pub fn state(&self) -> ConsumerState {
        *self.state_rx.borrow()
    }

    /// Wait until the consumer reaches `state`
    pub async fn wait_for(&mut self, state: ConsumerState) {
        // Sender lives as long as the consumer; a closed channel means it stopped
        let _ = self.state_rx.wait_for(|s| *s == state).await;
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed.load(Ordering::Relaxed)
    }
}

/// Consumer-group reader applying lifecycle events to the store
pub struct StreamConsumer {
    topics: Arc<dyn TopicBackend>,
    store: Arc<dyn IngestStore>,
    handlers: EventHandlers,
    config: ConsumerConfig,
    claim: ClaimSettings,
    events_processed: Arc<AtomicU64>,
    state_tx: watch::Sender<ConsumerState>,
}

impl StreamConsumer {
    pub fn new(
        topics: Arc<dyn TopicBackend>,
        store: Arc<dyn IngestStore>,
        handlers: EventHandlers,
        config: ConsumerConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConsumerState::Stopped);
        Self {
            topics,
            store,
            handlers,
            config,
            claim: ClaimSettings::default(),
            events_processed: Arc::new(AtomicU64::new(0)),
            state_tx,
        }
    }

    pub fn with_claim_settings(mut self, claim: ClaimSettings) -> Self {
        self.claim = claim;
        self
    }

    pub fn handle(&self) -> ConsumerHandle {
        ConsumerHandle {
            state_rx: self.state_tx.subscribe(),
            events_processed: Arc::clone(&self.events_processed),
        }
    }

    /// Shared events-processed counter (read by the liveness publisher)
    pub fn events_processed_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.events_processed)
    }

    fn set_state(&self, state: ConsumerState) {
        self.state_tx.send_replace(state);
        tracing::debug!(state = state.as_str(), "Consumer state changed");
    }

    /// Spawn the consume loop
    pub fn start(self, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown_rx).await })
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        self.set_state(ConsumerState::Connecting);
        if let Err(e) = self.connect().await {
            tracing::error!(error = %e, stream = %self.config.stream, "Consumer failed to connect");
            self.set_state(ConsumerState::Stopped);
            return;
        }
        self.set_state(ConsumerState::GroupReady);

        tracing::info!(
            stream = %self.config.stream,
            group = %self.config.group,
            consumer = %self.config.consumer_name,
            backend = self.topics.backend_name(),
            "Stream consumer started"
        );
        self.set_state(ConsumerState::Consuming);

        let mut last_claim = Instant::now();
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self
                .topics
                .stream_read(
                    &self.config.stream,
                    &self.config.group,
                    &self.config.consumer_name,
                    self.config.batch_size,
                    self.config.block_ms,
                )
                .await
            {
                Ok(entries) if entries.is_empty() => {}
                Ok(entries) => {
                    self.process_batch(entries).await;
                }
                Err(TopicError::NoGroup(group)) => {
                    tracing::warn!(group = %group, "Consumer group missing, recreating");
                    if let Err(e) = self
                        .topics
                        .ensure_group(&self.config.stream, &self.config.group)
                        .await
                    {
                        tracing::error!(error = %e, "Failed to recreate consumer group");
                        backoff(&mut shutdown_rx).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Stream read failed, backing off");
                    backoff(&mut shutdown_rx).await;
                }
            }

            if last_claim.elapsed() >= self.claim.interval {
                self.claim_stuck().await;
                last_claim = Instant::now();
            }
        }

        self.set_state(ConsumerState::Stopping);
        tracing::info!(
            events_processed = self.events_processed.load(Ordering::Relaxed),
            "Stream consumer stopping"
        );
        self.set_state(ConsumerState::Stopped);
    }

    /// Verify the log is reachable and the consumer group exists
    async fn connect(&self) -> Result<(), TopicError> {
        retry_with_backoff_async(
            "log connection",
            DEFAULT_MAX_ATTEMPTS,
            DEFAULT_BASE_DELAY_MS,
            || async {
                self.topics.health_check().await?;
                self.topics
                    .ensure_group(&self.config.stream, &self.config.group)
                    .await
            },
        )
        .await
    }

    /// Claim entries idle past the threshold and run them through the batch path
    pub async fn claim_stuck(&self) -> BatchOutcome {
        match self
            .topics
            .stream_claim(
                &self.config.stream,
                &self.config.group,
                &self.config.consumer_name,
                self.claim.min_idle_ms,
                self.claim.max_count,
            )
            .await
        {
            Ok(entries) if entries.is_empty() => {
                tracing::trace!("No stuck entries to claim");
                BatchOutcome::default()
            }
            Ok(entries) => {
                tracing::info!(count = entries.len(), "Reprocessing claimed entries");
                self.process_batch(entries).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to claim stuck entries");
                BatchOutcome::default()
            }
        }
    }

    /// Apply a batch of entries and acknowledge the ones that committed
    pub async fn process_batch(&self, entries: Vec<LogEntry>) -> BatchOutcome {
        let mut events: Vec<LifecycleEvent> =
            entries.iter().map(LifecycleEvent::from_entry).collect();
        // Stable: same-priority events keep their log order
        events.sort_by_key(|event| event.kind.priority());

        let mut outcome = BatchOutcome::default();
        let mut ack_ids = Vec::with_capacity(events.len());
        let mut deferred_ids = Vec::new();
        let mut batch_tx: Option<Box<dyn IngestTx>> = None;

        for (index, event) in events.iter().enumerate() {
            match &event.kind {
                EventKind::Unknown(event_type) => {
                    tracing::warn!(
                        event_type = %event_type,
                        entry_id = %event.entry_id,
                        "Unknown event type, acknowledging"
                    );
                    outcome.skipped += 1;
                    ack_ids.push(event.entry_id.clone());
                }
                EventKind::TraceStart | EventKind::ObservationStart => {
                    match self.apply_committed(event).await {
                        Ok(()) => {
                            outcome.processed += 1;
                            ack_ids.push(event.entry_id.clone());
                        }
                        Err(e) => {
                            outcome.failed += 1;
                            log_failure(event, &e);
                        }
                    }
                }
                EventKind::ObservationEnd | EventKind::ObservationError => {
                    if batch_tx.is_none() {
                        match self.store.begin().await {
                            Ok(tx) => batch_tx = Some(tx),
                            Err(e) => {
                                outcome.failed += 1;
                                log_failure(event, &IngestError::Store(e));
                                continue;
                            }
                        }
                    }
                    let Some(tx) = batch_tx.as_mut() else {
                        continue;
                    };
                    match self.apply_in_savepoint(tx.as_mut(), event, index).await {
                        Ok(()) => deferred_ids.push(event.entry_id.clone()),
                        Err(e) => {
                            outcome.failed += 1;
                            log_failure(event, &e);
                        }
                    }
                }
            }
        }

        if let Some(tx) = batch_tx {
            match tx.commit().await {
                Ok(()) => {
                    outcome.processed += deferred_ids.len();
                    ack_ids.append(&mut deferred_ids);
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        count = deferred_ids.len(),
                        "Batch commit failed, leaving updates for redelivery"
                    );
                    outcome.failed += deferred_ids.len();
                }
            }
        }

        if !ack_ids.is_empty() {
            match self
                .topics
                .stream_ack(&self.config.stream, &self.config.group, &ack_ids)
                .await
            {
                Ok(acked) => outcome.acked = acked,
                Err(e) => {
                    tracing::warn!(error = %e, count = ack_ids.len(), "Failed to acknowledge entries");
                }
            }
        }

        self.events_processed
            .fetch_add(outcome.processed as u64, Ordering::Relaxed);

        tracing::info!(
            processed = outcome.processed,
            failed = outcome.failed,
            skipped = outcome.skipped,
            acked = outcome.acked,
            "Processed batch"
        );
        outcome
    }

    /// Run a start event in its own transaction
    async fn apply_committed(&self, event: &LifecycleEvent) -> Result<(), IngestError> {
        let mut tx = self.store.begin().await?;
        match self.handlers.handle(tx.as_mut(), event).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Run an update event inside a savepoint of the batch transaction
    async fn apply_in_savepoint(
        &self,
        tx: &mut dyn IngestTx,
        event: &LifecycleEvent,
        index: usize,
    ) -> Result<(), IngestError> {
        let savepoint = format!("event_{index}");
        tx.savepoint(&savepoint).await?;

        let result = match self.handlers.handle(&mut *tx, event).await {
            Ok(()) => tx.release_savepoint(&savepoint).await.map_err(IngestError::from),
            Err(e) => Err(e),
        };
        if result.is_err()
            && let Err(rollback_err) = tx.rollback_to_savepoint(&savepoint).await
        {
            tracing::warn!(error = %rollback_err, savepoint, "Rollback to savepoint failed");
        }
        result
    }
}

fn log_failure(event: &LifecycleEvent, error: &IngestError) {
    if let IngestError::Store(e) = error
        && e.is_transient()
    {
        tracing::warn!(
            error = %error,
            event_type = event.kind.as_str(),
            trace_id = event.trace_id.as_deref().unwrap_or("-"),
            entry_id = %event.entry_id,
            "Store unavailable, event left for redelivery"
        );
        return;
    }
    tracing::error!(
        error = %error,
        event_type = event.kind.as_str(),
        trace_id = event.trace_id.as_deref().unwrap_or("-"),
        entry_id = %event.entry_id,
        "Failed to process event"
    );
}

/// Sleep after a read error, returning early on shutdown
async fn backoff(shutdown_rx: &mut watch::Receiver<bool>) {
    tokio::select! {
        _ = shutdown_rx.changed() => {}
        _ = tokio::time::sleep(Duration::from_millis(READ_ERROR_BACKOFF_MS)) => {}
    }
}
