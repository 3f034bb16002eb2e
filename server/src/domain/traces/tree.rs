//! Observation tree with subtree aggregates
//!
//! Nodes live in an arena indexed by position; children are index lists.
//! Aggregates are computed bottom-up once the structure is fixed.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::data::types::Observation;

/// An observation with its children and subtree totals
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationTreeNode {
    #[serde(flatten)]
    pub observation: Observation,
    pub children: Vec<ObservationTreeNode>,
    /// This observation's own latency; `None` while unterminated
    pub latency_ms: Option<f64>,
    /// Own cost plus all descendants' costs; `None` when nothing in the
    /// subtree has a cost
    pub total_cost: Option<Decimal>,
    /// Sum of own and descendants' latencies (not wall-clock); `None` when
    /// nothing in the subtree has ended
    pub total_duration_ms: Option<f64>,
}

/// Build the forest of root nodes for one trace
///
/// Observations whose parent is not in the list become roots. Roots and
/// siblings are ordered by start time, keeping input order on ties.
pub fn build_tree(observations: Vec<Observation>) -> Vec<ObservationTreeNode> {
    let index_by_id: HashMap<&str, usize> = observations
        .iter()
        .enumerate()
        .map(|(i, o)| (o.id.as_str(), i))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); observations.len()];
    let mut roots = Vec::new();
    for (i, observation) in observations.iter().enumerate() {
        let parent = observation
            .parent_observation_id
            .as_deref()
            .and_then(|parent_id| index_by_id.get(parent_id).copied())
            .filter(|&parent| parent != i);
        match parent {
            Some(parent) => children[parent].push(i),
            None => roots.push(i),
        }
    }

    let by_start = |a: &usize, b: &usize| observations[*a].start_time.cmp(&observations[*b].start_time);
    roots.sort_by(by_start);
    for list in &mut children {
        list.sort_by(by_start);
    }

    let mut slots: Vec<Option<Observation>> = observations.into_iter().map(Some).collect();
    let mut forest: Vec<ObservationTreeNode> = roots
        .into_iter()
        .filter_map(|root| assemble(root, &children, &mut slots))
        .collect();

    // Parent cycles leave nodes unreachable from any root
    for index in 0..slots.len() {
        if let Some(node) = assemble(index, &children, &mut slots) {
            forest.push(node);
        }
    }
    forest
}

/// Move observation `index` and its descendants out of the arena
///
/// A node is taken at most once, so a parent cycle cannot recurse forever.
fn assemble(
    index: usize,
    children: &[Vec<usize>],
    slots: &mut [Option<Observation>],
) -> Option<ObservationTreeNode> {
    let observation = slots[index].take()?;

    let child_nodes: Vec<ObservationTreeNode> = children[index]
        .iter()
        .filter_map(|&child| assemble(child, children, slots))
        .collect();

    let total_cost = sum_present(
        observation.calculated_total_cost,
        child_nodes.iter().map(|c| c.total_cost),
    );
    let latency_ms = observation.latency_ms();
    let total_duration_ms = sum_present(
        latency_ms,
        child_nodes.iter().map(|c| c.total_duration_ms),
    );

    Some(ObservationTreeNode {
        observation,
        children: child_nodes,
        latency_ms,
        total_cost,
        total_duration_ms,
    })
}

/// Sum of the present values, `None` if all are absent
fn sum_present<T, I>(own: Option<T>, rest: I) -> Option<T>
where
    T: std::ops::Add<Output = T> + Copy,
    I: Iterator<Item = Option<T>>,
{
    std::iter::once(own)
        .chain(rest)
        .flatten()
        .reduce(|acc, value| acc + value)
}
