//! In-process relational store
//!
//! Backs development mode and tests. Mirrors the PostgreSQL semantics that
//! ingestion depends on:
//! - inserts are idempotent on the primary key (`ON CONFLICT DO NOTHING`)
//! - observations require an existing trace (foreign key)
//! - writes stay private to a transaction until commit
//! - savepoints can be rolled back individually
//!
//! A transaction records its writes as an ordered op log. Reads inside the
//! transaction overlay the op log on the committed tables. Commit replays
//! the log under the write lock.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::core::constants::DEFAULT_PROJECT_ID;
use crate::data::error::DataError;
use crate::data::traits::{IngestStore, IngestTx};
use crate::data::types::{DEFAULT_MODEL_PRICING, ModelPricing, Observation, Trace};

#[derive(Debug, Clone)]
struct ProjectEntry {
    tracing_enabled: bool,
}

/// Observation plus its insertion sequence (tie-breaker for ordering)
#[derive(Debug, Clone)]
struct StoredObservation {
    seq: u64,
    observation: Observation,
}

type PricingKey = (Option<String>, String, String);

#[derive(Debug, Default)]
struct Tables {
    projects: HashMap<String, ProjectEntry>,
    traces: HashMap<String, Trace>,
    observations: HashMap<String, StoredObservation>,
    pricing: HashMap<PricingKey, ModelPricing>,
    next_seq: u64,
}

impl Tables {
    fn apply(&mut self, op: TxOp) {
        match op {
            TxOp::InsertTrace(trace) => {
                self.traces.entry(trace.id.clone()).or_insert(trace);
            }
            TxOp::InsertObservation(observation) => {
                if !self.observations.contains_key(&observation.id) {
                    let seq = self.next_seq;
                    self.next_seq += 1;
                    self.observations
                        .insert(observation.id.clone(), StoredObservation { seq, observation });
                }
            }
            TxOp::UpdateObservation(observation) => {
                if let Some(stored) = self.observations.get_mut(&observation.id) {
                    stored.observation = observation;
                }
            }
        }
    }
}

/// In-memory store shared by all transactions
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Create a store seeded with the default project and global pricing
    pub fn new() -> Self {
        let store = Self {
            tables: Arc::new(RwLock::new(Tables::default())),
        };
        store.insert_project(DEFAULT_PROJECT_ID, true);
        for (provider, model, input, output) in DEFAULT_MODEL_PRICING {
            let (Ok(input), Ok(output)) = (Decimal::from_str(input), Decimal::from_str(output))
            else {
                tracing::warn!(%provider, %model, "Skipping unparseable default price");
                continue;
            };
            store.upsert_pricing(None, provider, model, input, output);
        }
        tracing::debug!(
            pricing_rows = DEFAULT_MODEL_PRICING.len(),
            "MemoryStore initialized"
        );
        store
    }

    /// Create or replace a project row
    pub fn insert_project(&self, project_id: &str, tracing_enabled: bool) {
        self.tables
            .write()
            .projects
            .insert(project_id.to_string(), ProjectEntry { tracing_enabled });
    }

    /// Create or replace a pricing row for a scope (`None` = global)
    pub fn upsert_pricing(
        &self,
        project_id: Option<&str>,
        hosting_provider: &str,
        model_name: &str,
        input_price_per_million: Decimal,
        output_price_per_million: Decimal,
    ) -> ModelPricing {
        let now = Utc::now();
        let key = (
            project_id.map(str::to_string),
            hosting_provider.to_string(),
            model_name.to_string(),
        );
        let mut tables = self.tables.write();
        let row = match tables.pricing.get(&key) {
            Some(existing) => ModelPricing {
                input_price_per_million,
                output_price_per_million,
                updated_at: now,
                ..existing.clone()
            },
            None => ModelPricing {
                id: uuid::Uuid::new_v4().to_string(),
                project_id: key.0.clone(),
                hosting_provider: key.1.clone(),
                model_name: key.2.clone(),
                input_price_per_million,
                output_price_per_million,
                created_at: now,
                updated_at: now,
            },
        };
        tables.pricing.insert(key, row.clone());
        row
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IngestStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn IngestTx>, DataError> {
        Ok(Box::new(MemoryTx {
            tables: Arc::clone(&self.tables),
            ops: Vec::new(),
            savepoints: Vec::new(),
        }))
    }

    async fn trace_project_id(&self, trace_id: &str) -> Result<Option<String>, DataError> {
        Ok(self
            .tables
            .read()
            .traces
            .get(trace_id)
            .map(|t| t.project_id.clone()))
    }

    async fn find_pricing(
        &self,
        project_id: Option<&str>,
        hosting_provider: &str,
        model_name: &str,
    ) -> Result<Option<ModelPricing>, DataError> {
        let key = (
            project_id.map(str::to_string),
            hosting_provider.to_string(),
            model_name.to_string(),
        );
        Ok(self.tables.read().pricing.get(&key).cloned())
    }

    async fn project_tracing_enabled(&self, project_id: &str) -> Result<Option<bool>, DataError> {
        Ok(self
            .tables
            .read()
            .projects
            .get(project_id)
            .map(|p| p.tracing_enabled))
    }

    async fn set_project_tracing_enabled(
        &self,
        project_id: &str,
        enabled: bool,
    ) -> Result<bool, DataError> {
        match self.tables.write().projects.get_mut(project_id) {
            Some(project) => {
                project.tracing_enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_trace(&self, trace_id: &str) -> Result<Option<Trace>, DataError> {
        Ok(self.tables.read().traces.get(trace_id).cloned())
    }

    async fn list_observations(&self, trace_id: &str) -> Result<Vec<Observation>, DataError> {
        let tables = self.tables.read();
        let mut rows: Vec<&StoredObservation> = tables
            .observations
            .values()
            .filter(|s| s.observation.trace_id == trace_id)
            .collect();
        rows.sort_by_key(|s| (s.observation.start_time, s.seq));
        Ok(rows.into_iter().map(|s| s.observation.clone()).collect())
    }

    async fn health_check(&self) -> Result<(), DataError> {
        Ok(())
    }
}

// ============================================================================
// Transactions
// ============================================================================

#[derive(Debug, Clone)]
enum TxOp {
    InsertTrace(Trace),
    InsertObservation(Observation),
    UpdateObservation(Observation),
}

/// Open transaction on a `MemoryStore`
pub struct MemoryTx {
    tables: Arc<RwLock<Tables>>,
    ops: Vec<TxOp>,
    /// Savepoint name and op-log length at creation
    savepoints: Vec<(String, usize)>,
}

impl MemoryTx {
    fn trace_visible(&self, trace_id: &str) -> bool {
        self.ops
            .iter()
            .any(|op| matches!(op, TxOp::InsertTrace(t) if t.id == trace_id))
            || self.tables.read().traces.contains_key(trace_id)
    }

    fn observation_visible(&self, id: &str) -> Option<Observation> {
        let pending = self.ops.iter().rev().find_map(|op| match op {
            TxOp::InsertObservation(o) | TxOp::UpdateObservation(o) if o.id == id => {
                Some(o.clone())
            }
            _ => None,
        });
        pending.or_else(|| {
            self.tables
                .read()
                .observations
                .get(id)
                .map(|s| s.observation.clone())
        })
    }

    fn savepoint_position(&self, name: &str) -> Result<usize, DataError> {
        self.savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| DataError::Transaction(format!("savepoint \"{}\" does not exist", name)))
    }
}

#[async_trait]
impl IngestTx for MemoryTx {
    async fn insert_trace(&mut self, trace: &Trace) -> Result<bool, DataError> {
        if self.trace_visible(&trace.id) {
            return Ok(false);
        }
        self.ops.push(TxOp::InsertTrace(trace.clone()));
        Ok(true)
    }

    async fn insert_observation(&mut self, observation: &Observation) -> Result<bool, DataError> {
        if self.observation_visible(&observation.id).is_some() {
            return Ok(false);
        }
        if !self.trace_visible(&observation.trace_id) {
            return Err(DataError::ForeignKeyViolation {
                table: "observations",
                column: "trace_id",
                value: observation.trace_id.clone(),
            });
        }
        self.ops.push(TxOp::InsertObservation(observation.clone()));
        Ok(true)
    }

    async fn get_observation(&mut self, id: &str) -> Result<Option<Observation>, DataError> {
        Ok(self.observation_visible(id))
    }

    async fn update_observation(&mut self, observation: &Observation) -> Result<(), DataError> {
        if self.observation_visible(&observation.id).is_none() {
            return Err(DataError::NotFound {
                entity: "observation",
                id: observation.id.clone(),
            });
        }
        self.ops.push(TxOp::UpdateObservation(observation.clone()));
        Ok(())
    }

    async fn savepoint(&mut self, name: &str) -> Result<(), DataError> {
        self.savepoints.push((name.to_string(), self.ops.len()));
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<(), DataError> {
        let pos = self.savepoint_position(name)?;
        self.savepoints.truncate(pos);
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), DataError> {
        let pos = self.savepoint_position(name)?;
        let (_, len) = self.savepoints[pos];
        self.ops.truncate(len);
        // The savepoint itself survives, later ones are discarded
        self.savepoints.truncate(pos + 1);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DataError> {
        let MemoryTx { tables, ops, .. } = *self;
        let count = ops.len();
        let mut tables = tables.write();
        for op in ops {
            tables.apply(op);
        }
        tracing::trace!(ops = count, "MemoryStore transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DataError> {
        tracing::trace!(ops = self.ops.len(), "MemoryStore transaction rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::ObservationType;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn trace(id: &str) -> Trace {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Trace {
            id: id.to_string(),
            project_id: "p1".to_string(),
            name: "workflow".to_string(),
            user_id: None,
            session_id: None,
            meta: serde_json::json!({}),
            tags: vec![],
            input: None,
            output: None,
            timestamp: ts,
            created_at: ts,
        }
    }

    fn observation(id: &str, trace_id: &str, offset_ms: i64) -> Observation {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + Duration::milliseconds(offset_ms);
        Observation::new(id, trace_id, ObservationType::Span, id, start)
    }

    #[tokio::test]
    async fn test_new_store_is_seeded() {
        let store = MemoryStore::new();
        assert_eq!(
            store.project_tracing_enabled(DEFAULT_PROJECT_ID).await.unwrap(),
            Some(true)
        );
        let row = store
            .find_pricing(None, "openai", "gpt-4-turbo")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.input_price_per_million, dec!(10));
        assert_eq!(row.output_price_per_million, dec!(30));
    }

    #[tokio::test]
    async fn test_insert_trace_is_idempotent() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert_trace(&trace("t1")).await.unwrap());
        assert!(!tx.insert_trace(&trace("t1")).await.unwrap());
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut renamed = trace("t1");
        renamed.name = "other".to_string();
        assert!(!tx.insert_trace(&renamed).await.unwrap());
        tx.commit().await.unwrap();

        assert_eq!(store.get_trace("t1").await.unwrap().unwrap().name, "workflow");
    }

    #[tokio::test]
    async fn test_observation_requires_trace() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = tx
            .insert_observation(&observation("o1", "missing", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::ForeignKeyViolation { .. }));
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_private() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_trace(&trace("t1")).await.unwrap();
        tx.insert_observation(&observation("o1", "t1", 0)).await.unwrap();
        assert!(tx.get_observation("o1").await.unwrap().is_some());
        assert!(store.get_trace("t1").await.unwrap().is_none());

        tx.rollback().await.unwrap();
        assert!(store.get_trace("t1").await.unwrap().is_none());
        assert!(store.list_observations("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_to_savepoint_discards_only_later_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_trace(&trace("t1")).await.unwrap();
        tx.insert_observation(&observation("o1", "t1", 0)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.savepoint("sp_1").await.unwrap();
        let mut first = tx.get_observation("o1").await.unwrap().unwrap();
        first.name = "kept".to_string();
        tx.update_observation(&first).await.unwrap();
        tx.release_savepoint("sp_1").await.unwrap();

        tx.savepoint("sp_2").await.unwrap();
        let mut second = tx.get_observation("o1").await.unwrap().unwrap();
        second.name = "discarded".to_string();
        tx.update_observation(&second).await.unwrap();
        tx.rollback_to_savepoint("sp_2").await.unwrap();
        tx.commit().await.unwrap();

        let rows = store.list_observations("t1").await.unwrap();
        assert_eq!(rows[0].name, "kept");
    }

    #[tokio::test]
    async fn test_unknown_savepoint_is_an_error() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.rollback_to_savepoint("nope").await,
            Err(DataError::Transaction(_))
        ));
    }

    #[tokio::test]
    async fn test_update_missing_observation_fails() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = tx
            .update_observation(&observation("ghost", "t1", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_observations_orders_by_start_time() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_trace(&trace("t1")).await.unwrap();
        tx.insert_observation(&observation("late", "t1", 500)).await.unwrap();
        tx.insert_observation(&observation("early", "t1", 100)).await.unwrap();
        tx.insert_observation(&observation("tie", "t1", 500)).await.unwrap();
        tx.commit().await.unwrap();

        let ids: Vec<String> = store
            .list_observations("t1")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec!["early", "late", "tie"]);
    }

    #[tokio::test]
    async fn test_set_project_tracing_enabled() {
        let store = MemoryStore::new();
        assert!(store.set_project_tracing_enabled("default", false).await.unwrap());
        assert_eq!(store.project_tracing_enabled("default").await.unwrap(), Some(false));
        assert!(!store.set_project_tracing_enabled("nope", false).await.unwrap());
        assert_eq!(store.project_tracing_enabled("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_project_pricing_is_separate_from_global() {
        let store = MemoryStore::new();
        store.upsert_pricing(Some("p1"), "openai", "gpt-4", dec!(1), dec!(2));
        let project = store.find_pricing(Some("p1"), "openai", "gpt-4").await.unwrap();
        let global = store.find_pricing(None, "openai", "gpt-4").await.unwrap();
        assert_eq!(project.unwrap().input_price_per_million, dec!(1));
        assert_eq!(global.unwrap().input_price_per_million, dec!(30));
    }
}
