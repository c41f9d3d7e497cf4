//! Deploy graph construction and scheduling order
//!
//! An edge `a -> b` means `b` depends on `a`, so `a` deploys first. Cycles
//! are construction errors. Topological ties break by a stable
//! lexicographic sort of node IDs so identical manifests always schedule
//! identically.

use kiln_types::NodeId;
use std::collections::{BTreeMap, BTreeSet};

/// Graph construction failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("duplicate node: {0}")]
    DuplicateNode(NodeId),

    #[error("edge references unknown node: {0}")]
    UnknownEdgeEndpoint(NodeId),

    #[error("dependency cycle involving: {}", .0.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", "))]
    CycleDetected(Vec<NodeId>),
}

/// A validated deploy DAG with a precomputed schedule.
#[derive(Debug, Clone)]
pub struct DeployGraph {
    nodes: Vec<NodeId>,
    edges: Vec<(NodeId, NodeId)>,
    order: Vec<NodeId>,
    levels: Vec<Vec<NodeId>>,
}

impl DeployGraph {
    /// Build and validate a graph. Rejects duplicate nodes, dangling edge
    /// endpoints, and cycles.
    pub fn build(nodes: Vec<NodeId>, edges: Vec<(NodeId, NodeId)>) -> Result<Self, GraphError> {
        let mut seen = BTreeSet::new();
        for node in &nodes {
            if !seen.insert(node.clone()) {
                return Err(GraphError::DuplicateNode(node.clone()));
            }
        }
        for (from, to) in &edges {
            if !seen.contains(from) {
                return Err(GraphError::UnknownEdgeEndpoint(from.clone()));
            }
            if !seen.contains(to) {
                return Err(GraphError::UnknownEdgeEndpoint(to.clone()));
            }
        }

        // Kahn's algorithm over a BTreeMap: the ready set pops smallest
        // first, which pins the order for equal-depth nodes.
        let mut dependents: BTreeMap<&NodeId, Vec<&NodeId>> = BTreeMap::new();
        let mut in_degree: BTreeMap<&NodeId, usize> = nodes.iter().map(|n| (n, 0)).collect();
        for (from, to) in &edges {
            dependents.entry(from).or_default().push(to);
            if let Some(degree) = in_degree.get_mut(to) {
                *degree += 1;
            }
        }

        let mut ready: BTreeSet<&NodeId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();
        let mut order = Vec::with_capacity(nodes.len());
        let mut levels = Vec::new();

        while !ready.is_empty() {
            // One wave: everything ready now is mutually independent
            let wave: Vec<&NodeId> = ready.iter().copied().collect();
            ready.clear();
            let mut level = Vec::with_capacity(wave.len());
            for node in wave {
                order.push(node.clone());
                level.push(node.clone());
                for dependent in dependents.get(node).into_iter().flatten() {
                    if let Some(degree) = in_degree.get_mut(*dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.insert(*dependent);
                        }
                    }
                }
            }
            levels.push(level);
        }

        if order.len() != nodes.len() {
            let stuck: Vec<NodeId> = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(node, _)| node.clone())
                .collect();
            return Err(GraphError::CycleDetected(stuck));
        }

        Ok(Self {
            nodes,
            edges,
            order,
            levels,
        })
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Validated edges.
    pub fn edges(&self) -> &[(NodeId, NodeId)] {
        &self.edges
    }

    /// Full topological order, ties broken lexicographically.
    pub fn topo_order(&self) -> &[NodeId] {
        &self.order
    }

    /// Parallel waves: every node in a wave depends only on earlier waves.
    pub fn levels(&self) -> &[Vec<NodeId>] {
        &self.levels
    }
}
