//! Deploy plan types
//!
//! A DeployPlan is the durable record of a kit scheduled against an
//! environment: the dependency graph, the execution phase, and the
//! bookkeeping the executor needs for rollback.

use crate::config::RuntimeConfig;
use crate::ids::{InstanceId, NodeId, PlanId};
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a deploy plan.
///
/// No transition is reversible except by starting a new plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanPhase {
    /// Graph built, not yet validated
    Planned,
    /// Schema compatibility confirmed
    Validated,
    /// Executor is walking the graph
    Executing,
    /// Every node deployed
    Executed,
    /// Execution failed and every completed node was cleanly reverted
    RolledBack,
    /// Execution failed and at least one inverse operation is stuck
    Failed,
}

/// A concept deployment unit within a plan graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanNode {
    /// Node identifier (the concept name)
    pub id: NodeId,

    /// Concept being deployed
    pub concept: String,

    /// Runtime backend name
    pub runtime: String,

    /// Optional IaC backend
    pub iac: Option<String>,

    /// Optional secret backend
    pub secret_provider: Option<String>,

    /// Artifact reference to deploy
    pub artifact: Option<String>,

    /// Declared schema for compatibility validation
    pub schema: Option<String>,

    /// Runtime configuration for this node
    pub config: RuntimeConfig,
}

/// Inverse operation pushed when a node deploys, popped during rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum InverseOp {
    /// Revert a deployed instance to its previous version
    RollbackVersion {
        /// Node that produced this operation
        node: NodeId,
        /// Runtime backend to dispatch to
        runtime: String,
        /// Instance to revert
        instance: InstanceId,
    },

    /// Destroy a freshly provisioned instance
    DestroyInstance {
        /// Node that produced this operation
        node: NodeId,
        /// Runtime backend to dispatch to
        runtime: String,
        /// Instance to destroy
        instance: InstanceId,
    },

    /// Tear down an IaC stack
    TeardownStack {
        /// Node that produced this operation
        node: NodeId,
        /// IaC backend to dispatch to
        iac: String,
        /// Stack to tear down
        stack: String,
    },
}

impl InverseOp {
    /// Node this operation reverts.
    pub fn node(&self) -> &NodeId {
        match self {
            Self::RollbackVersion { node, .. }
            | Self::DestroyInstance { node, .. }
            | Self::TeardownStack { node, .. } => node,
        }
    }
}

/// A deploy plan record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployPlan {
    /// Unique plan identifier
    pub id: PlanId,

    /// Kit this plan deploys
    pub manifest: String,

    /// Target environment name
    pub environment: String,

    /// Deployment units, in insertion order
    pub graph_nodes: Vec<PlanNode>,

    /// Dependency edges: `(a, b)` means `b` depends on `a`
    pub graph_edges: Vec<(NodeId, NodeId)>,

    /// Current lifecycle phase
    pub phase: PlanPhase,

    /// Nodes deployed so far, in completion order
    pub completed_nodes: Vec<NodeId>,

    /// Nodes that failed to deploy
    pub failed_nodes: Vec<NodeId>,

    /// Inverse operations for the completed prefix, newest last
    pub rollback_stack: Vec<InverseOp>,

    /// Estimated total execution time in seconds
    pub estimated_duration_secs: u64,

    /// Created timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// Last updated timestamp
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl DeployPlan {
    /// Fraction of graph nodes deployed, in `[0.0, 1.0]`.
    pub fn progress(&self) -> f64 {
        if self.graph_nodes.is_empty() {
            return 0.0;
        }
        self.completed_nodes.len() as f64 / self.graph_nodes.len() as f64
    }

    /// Invariant: a node is never both completed and failed.
    pub fn node_sets_disjoint(&self) -> bool {
        self.completed_nodes
            .iter()
            .all(|n| !self.failed_nodes.contains(n))
    }

    /// Look up a node by ID.
    pub fn node(&self, id: &NodeId) -> Option<&PlanNode> {
        self.graph_nodes.iter().find(|n| &n.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> DeployPlan {
        DeployPlan {
            id: PlanId::new("dp-1"),
            manifest: "auth".to_string(),
            environment: "staging".to_string(),
            graph_nodes: vec![PlanNode {
                id: NodeId::new("User"),
                concept: "User".to_string(),
                runtime: "lambda".to_string(),
                iac: None,
                secret_provider: None,
                artifact: None,
                schema: None,
                config: RuntimeConfig::default(),
            }],
            graph_edges: Vec::new(),
            phase: PlanPhase::Planned,
            completed_nodes: Vec::new(),
            failed_nodes: Vec::new(),
            rollback_stack: Vec::new(),
            estimated_duration_secs: 60,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_progress_empty_and_complete() {
        let mut plan = sample_plan();
        assert_eq!(plan.progress(), 0.0);
        plan.completed_nodes.push(NodeId::new("User"));
        assert_eq!(plan.progress(), 1.0);
    }

    #[test]
    fn test_node_sets_disjoint() {
        let mut plan = sample_plan();
        plan.completed_nodes.push(NodeId::new("User"));
        assert!(plan.node_sets_disjoint());
        plan.failed_nodes.push(NodeId::new("User"));
        assert!(!plan.node_sets_disjoint());
    }
}
