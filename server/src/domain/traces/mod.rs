//! Read-side views of persisted traces
//!
//! - `tree` - parent/child hierarchy with cost and duration aggregates
//! - `graph` - START/END graph for visualization

mod graph;
mod tree;

use std::sync::Arc;

pub use graph::{END_NODE_ID, GraphEdge, GraphNode, ObservationGraph, START_NODE_ID, project_graph};
pub use tree::{ObservationTreeNode, build_tree};

use crate::data::error::DataError;
use crate::data::traits::IngestStore;

/// Builds trace views from the store
#[derive(Clone)]
pub struct TreeService {
    store: Arc<dyn IngestStore>,
}

impl TreeService {
    pub fn new(store: Arc<dyn IngestStore>) -> Self {
        Self { store }
    }

    /// Observation forest of a trace (one query)
    pub async fn trace_tree(&self, trace_id: &str) -> Result<Vec<ObservationTreeNode>, DataError> {
        let observations = self.store.list_observations(trace_id).await?;
        tracing::debug!(trace_id, count = observations.len(), "Building observation tree");
        Ok(build_tree(observations))
    }

    /// Visualization graph of a trace (one query)
    pub async fn trace_graph(&self, trace_id: &str) -> Result<ObservationGraph, DataError> {
        let observations = self.store.list_observations(trace_id).await?;
        Ok(project_graph(&observations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    use crate::data::memory::MemoryStore;
    use crate::data::types::{Observation, ObservationType, Trace};

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let mut tx = store.begin().await.unwrap();
        tx.insert_trace(&Trace {
            id: "t1".into(),
            project_id: "default".into(),
            name: "flow".into(),
            user_id: None,
            session_id: None,
            meta: serde_json::json!({}),
            tags: vec![],
            input: None,
            output: None,
            timestamp: now,
            created_at: now,
        })
        .await
        .unwrap();

        let root = Observation::new("root", "t1", ObservationType::Agent, "agent", now);
        let mut child = Observation::new(
            "llm",
            "t1",
            ObservationType::Generation,
            "llm",
            now + Duration::milliseconds(5),
        );
        child.parent_observation_id = Some("root".into());
        child.calculated_total_cost = Some(dec!(0.003));
        child.end_time = Some(child.start_time + Duration::milliseconds(250));
        tx.insert_observation(&root).await.unwrap();
        tx.insert_observation(&child).await.unwrap();
        tx.commit().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_trace_tree_from_store() {
        let service = TreeService::new(seeded_store().await);
        let tree = service.trace_tree("t1").await.unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].total_cost, Some(dec!(0.003)));
        assert_eq!(tree[0].total_duration_ms, Some(250.0));
        assert_eq!(tree[0].children.len(), 1);
    }

    #[tokio::test]
    async fn test_trace_graph_from_store() {
        let service = TreeService::new(seeded_store().await);
        let graph = service.trace_graph("t1").await.unwrap();
        assert_eq!(graph.nodes.len(), 4);
        assert_eq!(graph.edges.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_trace_is_empty() {
        let service = TreeService::new(Arc::new(MemoryStore::new()));
        assert!(service.trace_tree("missing").await.unwrap().is_empty());
        assert_eq!(service.trace_graph("missing").await.unwrap().edges.len(), 1);
    }
}
