//! Graph projection of a trace for visualization

use std::collections::HashSet;

use serde::Serialize;

use crate::data::types::Observation;

pub const START_NODE_ID: &str = "__start__";
pub const END_NODE_ID: &str = "__end__";
const SYSTEM_NODE_TYPE: &str = "SYSTEM";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: String,
}

impl GraphNode {
    fn system(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            node_type: SYSTEM_NODE_TYPE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
}

impl GraphEdge {
    fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservationGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Project observations into START → observations → END
///
/// Roots hang off START and leaves feed END. A root has no parent, a parent
/// outside the list, or itself as parent. Node and edge order follow the
/// input order.
pub fn project_graph(observations: &[Observation]) -> ObservationGraph {
    let mut nodes = Vec::with_capacity(observations.len() + 2);
    nodes.push(GraphNode::system(START_NODE_ID, "Start"));
    nodes.extend(observations.iter().map(|o| GraphNode {
        id: o.id.clone(),
        label: o.name.clone(),
        node_type: o.observation_type.as_str().to_string(),
    }));
    nodes.push(GraphNode::system(END_NODE_ID, "End"));

    if observations.is_empty() {
        return ObservationGraph {
            nodes,
            edges: vec![GraphEdge::new(START_NODE_ID, END_NODE_ID)],
        };
    }

    let ids: HashSet<&str> = observations.iter().map(|o| o.id.as_str()).collect();
    let parents: HashSet<&str> = observations
        .iter()
        .filter_map(|o| present_parent(o, &ids))
        .collect();

    let mut edges = Vec::new();
    for observation in observations {
        if let Some(parent) = present_parent(observation, &ids) {
            edges.push(GraphEdge::new(parent, &observation.id));
        }
    }
    for observation in observations {
        if present_parent(observation, &ids).is_none() {
            edges.push(GraphEdge::new(START_NODE_ID, &observation.id));
        }
    }
    for observation in observations {
        if !parents.contains(observation.id.as_str()) {
            edges.push(GraphEdge::new(&observation.id, END_NODE_ID));
        }
    }

    ObservationGraph { nodes, edges }
}

/// Parent id, when that parent is another observation of the trace
fn present_parent<'a>(observation: &'a Observation, ids: &HashSet<&str>) -> Option<&'a str> {
    observation
        .parent_observation_id
        .as_deref()
        .filter(|parent| *parent != observation.id && ids.contains(parent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::data::types::ObservationType;

    fn obs(id: &str, parent: Option<&str>, observation_type: ObservationType) -> Observation {
        let mut o = Observation::new(id, "t1", observation_type, format!("{id}-name"), Utc::now());
        o.parent_observation_id = parent.map(str::to_string);
        o
    }

    fn edge_pairs(graph: &ObservationGraph) -> Vec<(&str, &str)> {
        graph
            .edges
            .iter()
            .map(|e| (e.from.as_str(), e.to.as_str()))
            .collect()
    }

    #[test]
    fn test_empty_graph() {
        let graph = project_graph(&[]);
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.nodes[0].id, START_NODE_ID);
        assert_eq!(graph.nodes[0].label, "Start");
        assert_eq!(graph.nodes[1].id, END_NODE_ID);
        assert_eq!(graph.nodes[1].node_type, "SYSTEM");
        assert_eq!(edge_pairs(&graph), vec![(START_NODE_ID, END_NODE_ID)]);
    }

    #[test]
    fn test_unrelated_observations() {
        let observations: Vec<Observation> = (0..3)
            .map(|i| obs(&format!("o{i}"), None, ObservationType::Span))
            .collect();
        let graph = project_graph(&observations);

        assert_eq!(graph.nodes.len(), 5);
        let pairs = edge_pairs(&graph);
        assert_eq!(pairs.iter().filter(|(f, _)| *f == START_NODE_ID).count(), 3);
        assert_eq!(pairs.iter().filter(|(_, t)| *t == END_NODE_ID).count(), 3);
        assert_eq!(pairs.len(), 6);
    }

    #[test]
    fn test_chain_edge_order() {
        let graph = project_graph(&[
            obs("agent", None, ObservationType::Agent),
            obs("llm", Some("agent"), ObservationType::Generation),
            obs("tool", Some("agent"), ObservationType::Tool),
        ]);

        assert_eq!(
            edge_pairs(&graph),
            vec![
                ("agent", "llm"),
                ("agent", "tool"),
                (START_NODE_ID, "agent"),
                ("llm", END_NODE_ID),
                ("tool", END_NODE_ID),
            ]
        );
        assert_eq!(graph.nodes[1].node_type, "AGENT");
        assert_eq!(graph.nodes[2].label, "llm-name");
    }

    #[test]
    fn test_missing_parent_connects_to_start() {
        let graph = project_graph(&[obs("child", Some("elsewhere"), ObservationType::Span)]);
        assert_eq!(
            edge_pairs(&graph),
            vec![(START_NODE_ID, "child"), ("child", END_NODE_ID)]
        );
    }

    #[test]
    fn test_self_parented_observation_is_a_root() {
        let graph = project_graph(&[
            obs("loop", Some("loop"), ObservationType::Span),
            obs("child", Some("loop"), ObservationType::Tool),
        ]);
        assert_eq!(
            edge_pairs(&graph),
            vec![
                ("loop", "child"),
                (START_NODE_ID, "loop"),
                ("child", END_NODE_ID),
            ]
        );
    }

    #[test]
    fn test_edge_serializes_from_to() {
        let json = serde_json::to_value(project_graph(&[])).unwrap();
        assert_eq!(json["edges"][0]["from"], START_NODE_ID);
        assert_eq!(json["edges"][0]["to"], END_NODE_ID);
        assert_eq!(json["nodes"][0]["type"], "SYSTEM");
    }
}
