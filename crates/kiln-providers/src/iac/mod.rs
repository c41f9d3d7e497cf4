//! Infrastructure-as-code provider family
//!
//! Backends turn a deploy plan into provider-native stack definitions,
//! preview the resource delta, apply it, and tear it down. Generated files
//! always go through the Emitter; the core never writes files directly.
//!
//! The in-memory backends simulate the provider engines deterministically:
//! a resource whose name contains `invalid` fails validation during apply
//! and the stack rolls back.

pub mod cloud_formation;
pub mod docker_compose;
pub mod pulumi;

pub use cloud_formation::CloudFormationIac;
pub use docker_compose::DockerComposeIac;
pub use pulumi::PulumiIac;

use crate::emitter::Emitter;
use async_trait::async_trait;
use kiln_store::Relation;
use kiln_types::{DeployPlan, IacConfig, PlanId};
use tracing::{info, warn};

/// A generated stack: the handle plus the files that were emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedStack {
    /// Stack handle for preview/apply/teardown
    pub stack: String,
    /// Paths written through the emitter
    pub files: Vec<String>,
}

/// Outcome of `preview`.
#[derive(Debug, Clone, PartialEq)]
pub enum PreviewOutcome {
    /// Resource delta against current state
    Ok {
        to_create: Vec<String>,
        to_update: Vec<String>,
        to_delete: Vec<String>,
        estimated_cost: Option<f64>,
    },
    /// Unknown stack
    NotFound,
}

/// Outcome of `apply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Stack applied
    Ok {
        created: Vec<String>,
        updated: Vec<String>,
    },
    /// Caller-supplied capabilities do not cover the stack's requirements
    InsufficientCapabilities { required: Vec<String> },
    /// Apply failed mid-way and the stack rolled back to its prior state
    RolledBack { reason: String },
    /// Unknown stack
    NotFound,
}

/// Outcome of `teardown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// Stack destroyed
    Ok { destroyed: Vec<String> },
    /// Unknown stack
    NotFound,
}

/// Uniform contract over IaC backends.
#[async_trait]
pub trait IacProvider: Send + Sync {
    /// Backend name used in manifests and the provider registry.
    fn name(&self) -> &'static str;

    /// Generate stack definition files for a plan, routed through the
    /// emitter.
    async fn generate(
        &self,
        plan: &DeployPlan,
        options: &IacConfig,
        emitter: &dyn Emitter,
    ) -> GeneratedStack;

    /// Preview the resource delta the next apply would produce.
    async fn preview(&self, stack: &str) -> PreviewOutcome;

    /// Apply the stack with the caller's granted capabilities.
    async fn apply(&self, stack: &str, capabilities: &[String]) -> ApplyOutcome;

    /// Destroy every applied resource in the stack.
    async fn teardown(&self, stack: &str) -> TeardownOutcome;
}

/// A stack record owned by one IaC backend.
#[derive(Debug, Clone)]
pub(crate) struct IacStack {
    pub(crate) plan: PlanId,
    pub(crate) resources: Vec<String>,
    pub(crate) applied: Vec<String>,
    pub(crate) required_capabilities: Vec<String>,
    pub(crate) per_resource_cost: Option<f64>,
}

/// Shared stack state machine for IaC backends.
pub(crate) struct StackTable {
    stacks: Relation<IacStack>,
}

impl StackTable {
    pub(crate) fn new(relation_name: &'static str) -> Self {
        Self {
            stacks: Relation::new(relation_name),
        }
    }

    pub(crate) fn record(
        &self,
        stack: &str,
        plan: &DeployPlan,
        resources: Vec<String>,
        required_capabilities: Vec<String>,
        per_resource_cost: Option<f64>,
    ) {
        self.stacks.put(
            stack,
            IacStack {
                plan: plan.id.clone(),
                resources,
                applied: Vec::new(),
                required_capabilities,
                per_resource_cost,
            },
        );
    }

    pub(crate) fn preview(&self, stack: &str) -> PreviewOutcome {
        match self.stacks.get(stack) {
            Some(record) => {
                let to_create: Vec<String> = record
                    .resources
                    .iter()
                    .filter(|r| !record.applied.contains(r))
                    .cloned()
                    .collect();
                let to_update: Vec<String> = record
                    .resources
                    .iter()
                    .filter(|r| record.applied.contains(r))
                    .cloned()
                    .collect();
                let to_delete: Vec<String> = record
                    .applied
                    .iter()
                    .filter(|r| !record.resources.contains(r))
                    .cloned()
                    .collect();
                let estimated_cost = record
                    .per_resource_cost
                    .map(|cost| cost * record.resources.len() as f64);
                PreviewOutcome::Ok {
                    to_create,
                    to_update,
                    to_delete,
                    estimated_cost,
                }
            }
            None => PreviewOutcome::NotFound,
        }
    }

    pub(crate) fn apply(&self, stack: &str, capabilities: &[String]) -> ApplyOutcome {
        let result = self.stacks.update(stack, |record| {
            let missing: Vec<String> = record
                .required_capabilities
                .iter()
                .filter(|c| !capabilities.contains(c))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return ApplyOutcome::InsufficientCapabilities {
                    required: record.required_capabilities.clone(),
                };
            }

            if let Some(bad) = record.resources.iter().find(|r| r.contains("invalid")) {
                return ApplyOutcome::RolledBack {
                    reason: format!("resource {} failed validation", bad),
                };
            }

            let created: Vec<String> = record
                .resources
                .iter()
                .filter(|r| !record.applied.contains(r))
                .cloned()
                .collect();
            let updated: Vec<String> = record
                .resources
                .iter()
                .filter(|r| record.applied.contains(r))
                .cloned()
                .collect();
            record.applied = record.resources.clone();
            ApplyOutcome::Ok { created, updated }
        });

        match result {
            Ok(outcome) => {
                match &outcome {
                    ApplyOutcome::Ok { created, updated } => info!(
                        stack = stack,
                        created = created.len(),
                        updated = updated.len(),
                        "Stack applied"
                    ),
                    other => warn!(stack = stack, outcome = ?other, "Apply did not complete"),
                }
                outcome
            }
            Err(_) => ApplyOutcome::NotFound,
        }
    }

    pub(crate) fn teardown(&self, stack: &str) -> TeardownOutcome {
        match self.stacks.update(stack, |record| {
            (std::mem::take(&mut record.applied), record.plan.clone())
        }) {
            Ok((destroyed, plan)) => {
                info!(stack = stack, plan = %plan, destroyed = destroyed.len(), "Stack torn down");
                TeardownOutcome::Ok { destroyed }
            }
            Err(_) => TeardownOutcome::NotFound,
        }
    }
}

/// Resource names for a plan's nodes, `<runtime>/<concept>` per node.
pub(crate) fn plan_resources(plan: &DeployPlan) -> Vec<String> {
    plan.graph_nodes
        .iter()
        .map(|node| format!("{}/{}", node.runtime, node.concept))
        .collect()
}
