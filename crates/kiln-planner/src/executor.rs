//! Plan execution: topological waves, bounded parallelism, rollback
//!
//! Nodes execute in dependency order; independent nodes within a wave run
//! in parallel bounded by the per-plan concurrency cap. A node failure
//! drains the in-flight wave (a provider call is never interrupted), then
//! unwinds the completed prefix by popping inverse operations off the
//! rollback stack.

use crate::planner::Planner;
use futures::future::join_all;
use kiln_providers::{
    DeployOutcome, DestroyOutcome, ProvisionOutcome, RollbackOutcome, TeardownOutcome,
};
use kiln_types::{
    ExecuteConfig, InverseOp, KilnEvent, NodeId, PlanId, PlanNode, PlanPhase,
};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Outcome of `execute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// Every node deployed
    Ok {
        duration_secs: u64,
        nodes_deployed: usize,
    },
    /// A node failed; the completed prefix was cleanly reverted
    RolledBack {
        reason: String,
        rolled_back: Vec<NodeId>,
    },
    /// A node failed and some inverse operations are stuck
    RollbackFailed {
        reason: String,
        rolled_back: Vec<NodeId>,
        stuck: Vec<NodeId>,
    },
    /// Plan is not in the validated phase
    WrongPhase { phase: PlanPhase },
    /// Unknown plan
    NotFound,
}

/// Outcome of `rollback`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackPlanOutcome {
    /// Every inverse operation completed
    Ok { rolled_back: Vec<NodeId> },
    /// Some inverse operations are stuck
    Partial {
        rolled_back: Vec<NodeId>,
        stuck: Vec<NodeId>,
    },
    /// Unknown plan
    NotFound,
}

/// Result of deploying one node.
struct NodeResult {
    node: NodeId,
    outcome: Result<InverseOp, String>,
}

impl Planner {
    /// Execute a validated plan.
    #[instrument(skip(self, config), fields(plan = %plan))]
    pub async fn execute(&self, plan: &PlanId, config: &ExecuteConfig) -> ExecuteOutcome {
        let Some(record) = self.plans.get(plan.as_str()) else {
            return ExecuteOutcome::NotFound;
        };
        if record.phase != PlanPhase::Validated {
            return ExecuteOutcome::WrongPhase {
                phase: record.phase,
            };
        }

        let node_ids: Vec<NodeId> = record.graph_nodes.iter().map(|n| n.id.clone()).collect();
        let graph = match crate::graph::DeployGraph::build(node_ids, record.graph_edges.clone()) {
            Ok(graph) => graph,
            Err(error) => {
                // Cannot happen for a plan that passed `plan`; fail closed
                self.set_phase(plan, PlanPhase::Failed);
                return ExecuteOutcome::RollbackFailed {
                    reason: error.to_string(),
                    rolled_back: Vec::new(),
                    stuck: Vec::new(),
                };
            }
        };

        self.set_phase(plan, PlanPhase::Executing);
        let started = tokio::time::Instant::now();
        let max_parallel = config.max_parallel.max(1);
        let mut failure: Option<(NodeId, String)> = None;

        'waves: for wave in graph.levels() {
            for chunk in wave.chunks(max_parallel) {
                self.active_nodes
                    .insert(plan.as_str().to_string(), chunk.to_vec());

                let deployments = chunk.iter().filter_map(|id| {
                    record.node(id).map(|node| self.deploy_node(node.clone(), config))
                });
                let results = join_all(deployments).await;

                self.active_nodes.remove(plan.as_str());

                for result in results {
                    match result.outcome {
                        Ok(inverse) => {
                            let schema = record
                                .node(&result.node)
                                .and_then(|n| n.schema.clone());
                            let _ = self.plans.update(plan.as_str(), |p| {
                                p.completed_nodes.push(result.node.clone());
                                p.rollback_stack.push(inverse.clone());
                                p.updated_at = chrono::Utc::now();
                            });
                            if let Some(schema) = schema {
                                if let Some(node) = record.node(&result.node) {
                                    self.deployed_schemas.put(&node.concept, schema);
                                }
                            }
                            self.emit(KilnEvent::NodeDeployed {
                                plan: plan.clone(),
                                node: result.node,
                            });
                        }
                        Err(reason) => {
                            warn!(plan = %plan, node = %result.node, reason = %reason, "Node failed");
                            let _ = self.plans.update(plan.as_str(), |p| {
                                p.failed_nodes.push(result.node.clone());
                                p.updated_at = chrono::Utc::now();
                            });
                            self.emit(KilnEvent::NodeFailed {
                                plan: plan.clone(),
                                node: result.node.clone(),
                                reason: reason.clone(),
                            });
                            if failure.is_none() {
                                failure = Some((result.node, reason));
                            }
                        }
                    }
                }

                if failure.is_some() {
                    break 'waves;
                }
            }
        }

        let duration_secs = started.elapsed().as_secs();
        match failure {
            None => {
                self.set_phase(plan, PlanPhase::Executed);
                let nodes_deployed = self
                    .plans
                    .get(plan.as_str())
                    .map(|p| p.completed_nodes.len())
                    .unwrap_or(0);
                info!(plan = %plan, nodes = nodes_deployed, "Plan executed");
                self.emit(KilnEvent::PlanExecuted {
                    plan: plan.clone(),
                    duration_secs,
                    nodes_deployed,
                });
                if let Some(p) = self.plans.get(plan.as_str()) {
                    self.telemetry
                        .deploy_marker(&p.manifest, plan.as_str(), &p.environment, "executed")
                        .await;
                }
                ExecuteOutcome::Ok {
                    duration_secs,
                    nodes_deployed,
                }
            }
            Some((node, reason)) => {
                let reason = format!("{}: {}", node, reason);
                let (rolled_back, stuck) = self.unwind(plan).await;
                let phase = if stuck.is_empty() {
                    PlanPhase::RolledBack
                } else {
                    PlanPhase::Failed
                };
                self.set_phase(plan, phase);
                self.emit(KilnEvent::PlanRolledBack {
                    plan: plan.clone(),
                    rolled_back: rolled_back.clone(),
                    stuck: stuck.clone(),
                });
                if let Some(p) = self.plans.get(plan.as_str()) {
                    let status = if stuck.is_empty() { "rolledback" } else { "failed" };
                    self.telemetry
                        .deploy_marker(&p.manifest, plan.as_str(), &p.environment, status)
                        .await;
                }
                if stuck.is_empty() {
                    ExecuteOutcome::RolledBack {
                        reason,
                        rolled_back,
                    }
                } else {
                    ExecuteOutcome::RollbackFailed {
                        reason,
                        rolled_back,
                        stuck,
                    }
                }
            }
        }
    }

    /// Revert every completed node by invoking inverse operations in
    /// reverse completion order.
    #[instrument(skip(self), fields(plan = %plan))]
    pub async fn rollback(&self, plan: &PlanId) -> RollbackPlanOutcome {
        if !self.plans.contains(plan.as_str()) {
            return RollbackPlanOutcome::NotFound;
        }
        let (rolled_back, stuck) = self.unwind(plan).await;
        let phase = if stuck.is_empty() {
            PlanPhase::RolledBack
        } else {
            PlanPhase::Failed
        };
        self.set_phase(plan, phase);
        self.emit(KilnEvent::PlanRolledBack {
            plan: plan.clone(),
            rolled_back: rolled_back.clone(),
            stuck: stuck.clone(),
        });
        if stuck.is_empty() {
            RollbackPlanOutcome::Ok { rolled_back }
        } else {
            RollbackPlanOutcome::Partial { rolled_back, stuck }
        }
    }

    /// Pop and dispatch every inverse operation. State errors from the
    /// provider (nothing to revert, already gone) count as successes;
    /// genuine failures land in `stuck`.
    async fn unwind(&self, plan: &PlanId) -> (Vec<NodeId>, Vec<NodeId>) {
        let stack = self
            .plans
            .update(plan.as_str(), |p| std::mem::take(&mut p.rollback_stack))
            .unwrap_or_default();

        let mut rolled_back = Vec::new();
        let mut stuck = Vec::new();

        for op in stack.into_iter().rev() {
            let node = op.node().clone();
            let ok = match &op {
                InverseOp::RollbackVersion { runtime, instance, .. } => {
                    match self.registry.runtime(runtime) {
                        Some(provider) => !matches!(
                            provider.rollback(instance).await,
                            RollbackOutcome::Failed { .. }
                        ),
                        None => false,
                    }
                }
                InverseOp::DestroyInstance { runtime, instance, .. } => {
                    match self.registry.runtime(runtime) {
                        Some(provider) => !matches!(
                            provider.destroy(instance).await,
                            DestroyOutcome::Failed { .. }
                        ),
                        None => false,
                    }
                }
                InverseOp::TeardownStack { iac, stack, .. } => match self.registry.iac(iac) {
                    // A missing stack has nothing left to tear down
                    Some(provider) => matches!(
                        provider.teardown(stack).await,
                        TeardownOutcome::Ok { .. } | TeardownOutcome::NotFound
                    ),
                    None => false,
                },
            };

            if ok {
                info!(plan = %plan, node = %node, "Inverse operation applied");
                rolled_back.push(node);
            } else {
                warn!(plan = %plan, node = %node, "Inverse operation stuck");
                stuck.push(node);
            }
        }

        (rolled_back, stuck)
    }

    /// Deploy a single node: select the provider, provision, deploy, and
    /// hand back the inverse operation for the rollback stack.
    async fn deploy_node(&self, node: PlanNode, config: &ExecuteConfig) -> NodeResult {
        let Some(provider) = self.registry.runtime(&node.runtime) else {
            return NodeResult {
                node: node.id.clone(),
                outcome: Err(format!("unknown runtime backend {}", node.runtime)),
            };
        };

        let provisioned = provider.provision(&node.concept, &node.config).await;
        let instance = provisioned.instance().clone();
        // A fresh instance is destroyed on rollback; a reused one reverts
        // to its previous version instead.
        let inverse = match &provisioned {
            ProvisionOutcome::Ok { .. } => InverseOp::DestroyInstance {
                node: node.id.clone(),
                runtime: node.runtime.clone(),
                instance: instance.clone(),
            },
            ProvisionOutcome::AlreadyProvisioned { .. } => InverseOp::RollbackVersion {
                node: node.id.clone(),
                runtime: node.runtime.clone(),
                instance: instance.clone(),
            },
        };

        let artifact = node
            .artifact
            .clone()
            .unwrap_or_else(|| default_artifact(&node.runtime, &node.concept));

        let mut outcome = provider.deploy(&instance, &artifact).await;
        if outcome.is_transient() && config.retry_transient {
            tokio::time::sleep(Duration::from_millis(200)).await;
            info!(node = %node.id, "Retrying transient deploy failure");
            outcome = provider.deploy(&instance, &artifact).await;
        }

        match outcome {
            DeployOutcome::Ok { .. } => NodeResult {
                node: node.id,
                outcome: Ok(inverse),
            },
            DeployOutcome::BuildFailed { errors } => NodeResult {
                node: node.id,
                outcome: Err(format!("build failed: {}", errors.join("; "))),
            },
            DeployOutcome::ImageNotFound => NodeResult {
                node: node.id,
                outcome: Err(format!("image not found: {}", artifact)),
            },
            DeployOutcome::ImagePullBackOff => NodeResult {
                node: node.id,
                outcome: Err(format!("image pull backing off: {}", artifact)),
            },
            DeployOutcome::OomKilled => NodeResult {
                node: node.id,
                outcome: Err(format!(
                    "killed at startup with {}MB",
                    node.config.memory_mb
                )),
            },
            DeployOutcome::RuntimeUnsupported => NodeResult {
                node: node.id,
                outcome: Err(format!(
                    "{} cannot run artifact {}",
                    node.runtime, artifact
                )),
            },
            DeployOutcome::NotFound => NodeResult {
                node: node.id,
                outcome: Err(format!("instance {} vanished", instance)),
            },
        }
    }
}

/// Runtime-appropriate artifact reference for concepts that do not pin one.
fn default_artifact(runtime: &str, concept: &str) -> String {
    let name = concept.to_lowercase();
    match runtime {
        "lambda" | "cloud_functions" => format!("s3://kiln-artifacts/{}.zip", name),
        "cloudflare" | "vercel" => format!("{}.js", name),
        "kubernetes" | "cloud_run" | "docker_compose" => format!("kiln/{}:latest", name),
        _ => format!("kiln-build/{}", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::tests::{planner, SHOP_MANIFEST};
    use crate::planner::{PlanOutcome, StatusOutcome};
    use kiln_types::InstanceId;
    use std::collections::BTreeSet;

    async fn planned(planner: &Planner, manifest: &str) -> PlanId {
        match planner.plan(manifest, "staging").await {
            PlanOutcome::Ok { plan, .. } => plan,
            other => panic!("unexpected plan: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clean_execute_completes_every_node() {
        let planner = planner();
        let plan = planned(&planner, SHOP_MANIFEST).await;
        planner.validate(&plan).await;

        match planner.execute(&plan, &ExecuteConfig::default()).await {
            ExecuteOutcome::Ok { nodes_deployed, .. } => assert_eq!(nodes_deployed, 3),
            other => panic!("unexpected execute: {:?}", other),
        }

        let record = planner.get(&plan).await.unwrap();
        assert_eq!(record.phase, PlanPhase::Executed);
        let completed: BTreeSet<_> = record.completed_nodes.iter().collect();
        let all: BTreeSet<_> = record.graph_nodes.iter().map(|n| &n.id).collect();
        assert_eq!(completed, all);
        assert!(record.failed_nodes.is_empty());
        assert!(record.node_sets_disjoint());

        // Dependency order: Catalog before Cart before Checkout
        let position = |id: &str| {
            record
                .completed_nodes
                .iter()
                .position(|n| n.as_str() == id)
                .unwrap()
        };
        assert!(position("Catalog") < position("Cart"));
        assert!(position("Cart") < position("Checkout"));

        match planner.status(&plan).await {
            StatusOutcome::Ok { progress, active_nodes, .. } => {
                assert_eq!(progress, 1.0);
                assert!(active_nodes.is_empty());
            }
            other => panic!("unexpected status: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_requires_validation() {
        let planner = planner();
        let plan = planned(&planner, SHOP_MANIFEST).await;
        assert_eq!(
            planner.execute(&plan, &ExecuteConfig::default()).await,
            ExecuteOutcome::WrongPhase {
                phase: PlanPhase::Planned
            }
        );
        assert_eq!(
            planner
                .execute(&PlanId::new("dp-404"), &ExecuteConfig::default())
                .await,
            ExecuteOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_failed_node_rolls_back_completed_prefix() {
        let planner = planner();
        // Checkout pins an artifact Lambda cannot run
        let manifest = r#"{
            "kit": "shop",
            "concepts": [
                {"concept": "Catalog", "runtime": "lambda"},
                {"concept": "Checkout", "runtime": "lambda",
                 "artifact": "ghcr.io/acme/checkout:1.0",
                 "depends_on": ["Catalog"]}
            ]
        }"#;
        let plan = planned(&planner, manifest).await;
        planner.validate(&plan).await;

        match planner.execute(&plan, &ExecuteConfig::default()).await {
            ExecuteOutcome::RolledBack { reason, rolled_back } => {
                assert!(reason.contains("Checkout"));
                assert_eq!(rolled_back, vec![NodeId::new("Catalog")]);
            }
            other => panic!("unexpected execute: {:?}", other),
        }

        let record = planner.get(&plan).await.unwrap();
        assert_eq!(record.phase, PlanPhase::RolledBack);
        assert_eq!(record.failed_nodes, vec![NodeId::new("Checkout")]);
        assert!(record.rollback_stack.is_empty());

        // Catalog's fresh instance was destroyed on the way down
        let lambda = planner.registry.runtime("lambda").unwrap();
        let instance = lambda.find_instance("Catalog").await;
        assert!(instance.is_none());
    }

    #[tokio::test]
    async fn test_transient_pull_failure_is_retried_once() {
        let planner = planner();
        let manifest = r#"{
            "kit": "media",
            "concepts": [{
                "concept": "Resizer",
                "runtime": "kubernetes",
                "artifact": "flaky.registry/acme/resizer:3.1"
            }]
        }"#;
        let plan = planned(&planner, manifest).await;
        planner.validate(&plan).await;

        // First pull backs off; the single retry lands it
        match planner.execute(&plan, &ExecuteConfig::default()).await {
            ExecuteOutcome::Ok { nodes_deployed, .. } => assert_eq!(nodes_deployed, 1),
            other => panic!("unexpected execute: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transient_failure_without_retry_rolls_back() {
        let planner = planner();
        let manifest = r#"{
            "kit": "media",
            "concepts": [{
                "concept": "Resizer",
                "runtime": "kubernetes",
                "artifact": "flaky.registry/acme/resizer:3.1"
            }]
        }"#;
        let plan = planned(&planner, manifest).await;
        planner.validate(&plan).await;

        let config = ExecuteConfig {
            retry_transient: false,
            ..ExecuteConfig::default()
        };
        assert!(matches!(
            planner.execute(&plan, &config).await,
            ExecuteOutcome::RolledBack { .. }
        ));
    }

    #[tokio::test]
    async fn test_reused_instance_reverts_version_on_rollback() {
        let planner = planner();

        // First kit deploys User v1 cleanly
        let v1 = r#"{
            "kit": "auth",
            "concepts": [{"concept": "User", "runtime": "lambda",
                          "artifact": "s3://kiln-artifacts/user-v1.zip"}]
        }"#;
        let plan1 = planned(&planner, v1).await;
        planner.validate(&plan1).await;
        planner.execute(&plan1, &ExecuteConfig::default()).await;

        // Second kit re-deploys User (now v2) next to a doomed node
        let v2 = r#"{
            "kit": "auth",
            "concepts": [
                {"concept": "User", "runtime": "lambda",
                 "artifact": "s3://kiln-artifacts/user-v2.zip"},
                {"concept": "Sessions", "runtime": "lambda",
                 "artifact": "ghcr.io/acme/sessions:1.0",
                 "depends_on": ["User"]}
            ]
        }"#;
        let plan2 = planned(&planner, v2).await;
        planner.validate(&plan2).await;
        assert!(matches!(
            planner.execute(&plan2, &ExecuteConfig::default()).await,
            ExecuteOutcome::RolledBack { .. }
        ));

        // User survived at v1: the rollback popped v2 off its history
        let lambda = planner.registry.runtime("lambda").unwrap();
        let user = lambda.find_instance("User").await.unwrap();
        assert_eq!(user.current_version.as_deref(), Some("v1"));
        assert_eq!(
            user.current_artifact.as_deref(),
            Some("s3://kiln-artifacts/user-v1.zip")
        );
        assert!(user.history.is_empty());
    }

    #[tokio::test]
    async fn test_manual_rollback_with_poisoned_op_reports_stuck() {
        let planner = planner();
        let plan = planned(&planner, SHOP_MANIFEST).await;
        planner.validate(&plan).await;
        planner.execute(&plan, &ExecuteConfig::default()).await;

        // An inverse op pointing at an instance no backend knows
        planner
            .plans
            .update(plan.as_str(), |p| {
                p.rollback_stack.push(InverseOp::RollbackVersion {
                    node: NodeId::new("Phantom"),
                    runtime: "lambda".to_string(),
                    instance: InstanceId::new("lambda-999"),
                });
            })
            .unwrap();

        match planner.rollback(&plan).await {
            RollbackPlanOutcome::Partial { rolled_back, stuck } => {
                assert!(rolled_back.is_empty());
                assert_eq!(stuck, vec![NodeId::new("Phantom")]);
            }
            other => panic!("unexpected rollback: {:?}", other),
        }
        assert_eq!(planner.get(&plan).await.unwrap().phase, PlanPhase::Failed);
    }

    #[tokio::test]
    async fn test_manual_rollback_after_execute_is_clean() {
        let planner = planner();
        let plan = planned(&planner, SHOP_MANIFEST).await;
        planner.validate(&plan).await;
        planner.execute(&plan, &ExecuteConfig::default()).await;

        match planner.rollback(&plan).await {
            RollbackPlanOutcome::Ok { rolled_back } => {
                // Reverse completion order
                assert_eq!(
                    rolled_back,
                    vec![
                        NodeId::new("Checkout"),
                        NodeId::new("Cart"),
                        NodeId::new("Catalog")
                    ]
                );
            }
            other => panic!("unexpected rollback: {:?}", other),
        }
        assert_eq!(
            planner.get(&plan).await.unwrap().phase,
            PlanPhase::RolledBack
        );

        assert_eq!(
            planner.rollback(&PlanId::new("dp-404")).await,
            RollbackPlanOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_parallel_wave_respects_concurrency_cap() {
        let planner = planner();
        // Six independent concepts in one wave
        let manifest = r#"{
            "kit": "wide",
            "concepts": [
                {"concept": "A", "runtime": "local"},
                {"concept": "B", "runtime": "local"},
                {"concept": "C", "runtime": "local"},
                {"concept": "D", "runtime": "local"},
                {"concept": "E", "runtime": "local"},
                {"concept": "F", "runtime": "local"}
            ]
        }"#;
        let plan = planned(&planner, manifest).await;
        planner.validate(&plan).await;

        let config = ExecuteConfig {
            max_parallel: 2,
            ..ExecuteConfig::default()
        };
        match planner.execute(&plan, &config).await {
            ExecuteOutcome::Ok { nodes_deployed, .. } => assert_eq!(nodes_deployed, 6),
            other => panic!("unexpected execute: {:?}", other),
        }
    }
}
