//! Store traits for relational backends
//!
//! `IngestStore` is the pool-level interface used by the read paths and the
//! pricing lookups. `IngestTx` is a single open transaction used by the
//! stream consumer. Each backend (PostgreSQL, in-memory) implements both.

use async_trait::async_trait;

use crate::data::error::DataError;
use crate::data::types::{ModelPricing, Observation, Trace};

// ============================================================================
// Store Trait
// ============================================================================

/// Pool-level store operations
#[async_trait]
pub trait IngestStore: Send + Sync {
    /// Open a new transaction
    async fn begin(&self) -> Result<Box<dyn IngestTx>, DataError>;

    /// Project id of a committed trace
    async fn trace_project_id(&self, trace_id: &str) -> Result<Option<String>, DataError>;

    /// Pricing row for exactly this scope (`None` = global default row)
    async fn find_pricing(
        &self,
        project_id: Option<&str>,
        hosting_provider: &str,
        model_name: &str,
    ) -> Result<Option<ModelPricing>, DataError>;

    /// Tracing flag of a project, `None` when the project does not exist
    async fn project_tracing_enabled(&self, project_id: &str) -> Result<Option<bool>, DataError>;

    /// Update the tracing flag. Returns false when the project does not exist.
    async fn set_project_tracing_enabled(
        &self,
        project_id: &str,
        enabled: bool,
    ) -> Result<bool, DataError>;

    /// Get a single trace by ID
    async fn get_trace(&self, trace_id: &str) -> Result<Option<Trace>, DataError>;

    /// All observations of a trace, ordered by start time
    async fn list_observations(&self, trace_id: &str) -> Result<Vec<Observation>, DataError>;

    /// Verify the backend is reachable
    async fn health_check(&self) -> Result<(), DataError>;
}

// ============================================================================
// Transaction Trait
// ============================================================================

/// An open store transaction
///
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait IngestTx: Send {
    /// Insert a trace. Returns false when a trace with the same id already exists.
    async fn insert_trace(&mut self, trace: &Trace) -> Result<bool, DataError>;

    /// Insert an observation. Returns false when the id already exists.
    ///
    /// Fails with a foreign key error when the trace does not exist.
    async fn insert_observation(&mut self, observation: &Observation) -> Result<bool, DataError>;

    /// Load an observation visible to this transaction
    async fn get_observation(&mut self, id: &str) -> Result<Option<Observation>, DataError>;

    /// Overwrite the mutable fields of an existing observation
    async fn update_observation(&mut self, observation: &Observation) -> Result<(), DataError>;

    async fn savepoint(&mut self, name: &str) -> Result<(), DataError>;

    async fn release_savepoint(&mut self, name: &str) -> Result<(), DataError>;

    /// Undo everything written since the named savepoint
    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), DataError>;

    async fn commit(self: Box<Self>) -> Result<(), DataError>;

    async fn rollback(self: Box<Self>) -> Result<(), DataError>;
}
