//! Deploy planner: manifest to validated plan

use crate::env::EnvResolver;
use crate::graph::DeployGraph;
use crate::telemetry::Telemetry;
use dashmap::DashMap;
use kiln_providers::{Emitter, ProviderRegistry};
use kiln_store::Relation;
use kiln_types::{
    DeployPlan, EventSource, IdSource, KilnEvent, KilnEventEnvelope, KitManifest, NodeId, PlanId,
    PlanNode, PlanPhase, SchemaMode,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

/// Outcome of `plan`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    /// Plan created in the planned phase
    Ok {
        plan: PlanId,
        order: Vec<NodeId>,
        estimated_duration_secs: u64,
    },
    /// Manifest or environment rejected; nothing was stored
    InvalidManifest { errors: Vec<String> },
}

/// Outcome of `validate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidateOutcome {
    /// Plan validated
    Ok { warnings: Vec<String> },
    /// A declared schema is incompatible with the deployed one
    SchemaIncompatible { details: Vec<String> },
    /// Plan has moved past validation
    WrongPhase { phase: PlanPhase },
    /// Unknown plan
    NotFound,
}

/// Outcome of `status`.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusOutcome {
    /// Current phase and progress
    Ok {
        phase: PlanPhase,
        progress: f64,
        active_nodes: Vec<NodeId>,
    },
    /// Unknown plan
    NotFound,
}

/// Outcome of `provision_infra`.
#[derive(Debug, Clone, PartialEq)]
pub enum InfraOutcome {
    /// Stack generated and applied; teardown pushed onto the rollback stack
    Ok {
        stack: String,
        files: Vec<String>,
        created: Vec<String>,
        updated: Vec<String>,
    },
    /// Granted capabilities do not cover the stack's requirements
    InsufficientCapabilities { required: Vec<String> },
    /// Apply failed and the stack rolled back
    RolledBack { reason: String },
    /// No IaC backend registered under this name
    UnknownBackend { backend: String },
    /// Unknown plan
    NotFound,
}

/// Outcome of `emit_gitops`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitOpsOutcome {
    /// Manifests emitted
    Ok {
        manifest: String,
        files: Vec<String>,
    },
    /// No GitOps backend registered under this name
    UnknownBackend { backend: String },
    /// Unknown plan
    NotFound,
}

/// The deploy planner and executor.
///
/// Owns the `deploy_plan` relation and the record of deployed schemas.
/// Execution lives in `executor.rs`; this file covers plan construction,
/// validation, status, and the IaC/GitOps entry points.
pub struct Planner {
    pub(crate) plans: Relation<DeployPlan>,
    pub(crate) deployed_schemas: Relation<String>,
    pub(crate) active_nodes: DashMap<String, Vec<NodeId>>,
    pub(crate) registry: Arc<ProviderRegistry>,
    env: Arc<dyn EnvResolver>,
    pub(crate) telemetry: Arc<dyn Telemetry>,
    ids: Arc<dyn IdSource>,
    pub(crate) event_tx: broadcast::Sender<KilnEventEnvelope>,
}

impl Planner {
    /// Create a planner over a provider registry and boundary collaborators.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        env: Arc<dyn EnvResolver>,
        telemetry: Arc<dyn Telemetry>,
        ids: Arc<dyn IdSource>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(4096);
        Self {
            plans: Relation::new("deploy_plan"),
            deployed_schemas: Relation::new("deployed_schema"),
            active_nodes: DashMap::new(),
            registry,
            env,
            telemetry,
            ids,
            event_tx,
        }
    }

    /// Subscribe to plan lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<KilnEventEnvelope> {
        self.event_tx.subscribe()
    }

    /// The provider registry this planner dispatches against.
    pub fn registry(&self) -> Arc<ProviderRegistry> {
        self.registry.clone()
    }

    /// Transform a kit manifest into a stored deploy plan.
    ///
    /// Rejects an empty manifest or environment, unknown backends, unknown
    /// dependency targets, and cycles. The estimated duration is the sum of
    /// each node's provider estimate.
    #[instrument(skip(self, manifest_json))]
    pub async fn plan(&self, manifest_json: &str, environment: &str) -> PlanOutcome {
        let mut errors = Vec::new();

        if environment.trim().is_empty() {
            errors.push("environment is empty".to_string());
        } else if self.env.resolve(environment).is_none() {
            errors.push(format!("unknown environment: {}", environment));
        }

        let manifest = match KitManifest::parse(manifest_json) {
            Ok(manifest) => manifest,
            Err(error) => {
                errors.push(error.to_string());
                return PlanOutcome::InvalidManifest { errors };
            }
        };
        if manifest.is_empty() {
            errors.push("manifest names no concepts".to_string());
        }
        if !errors.is_empty() {
            return PlanOutcome::InvalidManifest { errors };
        }

        // Backend names must dispatch before anything is stored
        for entry in &manifest.concepts {
            if self.registry.runtime(&entry.runtime).is_none() {
                errors.push(format!(
                    "unknown runtime backend {} for {} (registered: {})",
                    entry.runtime,
                    entry.concept,
                    self.registry.runtime_names().join(", ")
                ));
            }
            if let Some(iac) = &entry.iac {
                if self.registry.iac(iac).is_none() {
                    errors.push(format!("unknown IaC backend {} for {}", iac, entry.concept));
                }
            }
            if let Some(secret) = &entry.secret_provider {
                if self.registry.secret(secret).is_none() {
                    errors.push(format!(
                        "unknown secret backend {} for {}",
                        secret, entry.concept
                    ));
                }
            }
        }
        if !errors.is_empty() {
            return PlanOutcome::InvalidManifest { errors };
        }

        let nodes: Vec<NodeId> = manifest
            .concepts
            .iter()
            .map(|entry| NodeId::new(entry.concept.clone()))
            .collect();
        let mut edges = Vec::new();
        for entry in &manifest.concepts {
            for dependency in &entry.depends_on {
                edges.push((NodeId::new(dependency.clone()), NodeId::new(entry.concept.clone())));
            }
        }

        let graph = match DeployGraph::build(nodes, edges) {
            Ok(graph) => graph,
            Err(error) => {
                return PlanOutcome::InvalidManifest {
                    errors: vec![error.to_string()],
                };
            }
        };

        let estimated_duration_secs = manifest
            .concepts
            .iter()
            .filter_map(|entry| self.registry.runtime(&entry.runtime))
            .map(|provider| provider.estimate_node_duration().as_secs())
            .sum();

        let graph_nodes: Vec<PlanNode> = manifest
            .concepts
            .iter()
            .map(|entry| PlanNode {
                id: NodeId::new(entry.concept.clone()),
                concept: entry.concept.clone(),
                runtime: entry.runtime.clone(),
                iac: entry.iac.clone(),
                secret_provider: entry.secret_provider.clone(),
                artifact: entry.artifact.clone(),
                schema: entry.schema.clone(),
                config: entry.config.clone(),
            })
            .collect();

        let id = PlanId::new(self.ids.next_id("dp"));
        let now = chrono::Utc::now();
        self.plans.put(
            id.as_str(),
            DeployPlan {
                id: id.clone(),
                manifest: manifest.kit.clone(),
                environment: environment.to_string(),
                graph_nodes,
                graph_edges: graph.edges().to_vec(),
                phase: PlanPhase::Planned,
                completed_nodes: Vec::new(),
                failed_nodes: Vec::new(),
                rollback_stack: Vec::new(),
                estimated_duration_secs,
                created_at: now,
                updated_at: now,
            },
        );

        info!(
            plan = %id,
            kit = %manifest.kit,
            environment = environment,
            nodes = graph.nodes().len(),
            estimated_duration_secs = estimated_duration_secs,
            "Plan created"
        );
        self.emit(KilnEvent::PlanCreated {
            plan: id.clone(),
            kit: manifest.kit,
            environment: environment.to_string(),
            node_count: graph.nodes().len(),
        });

        PlanOutcome::Ok {
            plan: id,
            order: graph.topo_order().to_vec(),
            estimated_duration_secs,
        }
    }

    /// Validate schema compatibility against the target environment.
    ///
    /// Compatibility is delegated to the runtime providers' `check_schema`;
    /// any incompatibility under a fatal mode (backward, forward, full)
    /// rejects the plan. Moves the phase from planned to validated.
    #[instrument(skip(self), fields(plan = %plan))]
    pub async fn validate(&self, plan: &PlanId) -> ValidateOutcome {
        let Some(record) = self.plans.get(plan.as_str()) else {
            return ValidateOutcome::NotFound;
        };
        match record.phase {
            PlanPhase::Planned | PlanPhase::Validated => {}
            phase => return ValidateOutcome::WrongPhase { phase },
        }

        let mut warnings = Vec::new();
        let mode = match self.env.resolve(&record.environment) {
            Some(environment) => environment.schema_mode,
            None => {
                warnings.push(format!(
                    "environment {} no longer resolvable; skipping schema checks",
                    record.environment
                ));
                SchemaMode::None
            }
        };

        let mut details = Vec::new();
        for node in &record.graph_nodes {
            let Some(new_schema) = &node.schema else {
                warnings.push(format!(
                    "{} declares no schema; compatibility not checked",
                    node.concept
                ));
                continue;
            };
            let Some(old_schema) = self.deployed_schemas.get(&node.concept) else {
                // First deploy of this concept; nothing to be compatible with
                continue;
            };
            let Some(provider) = self.registry.runtime(&node.runtime) else {
                continue;
            };
            let compatible = provider.check_schema(&old_schema, new_schema, mode).await;
            if !compatible {
                if mode.is_fatal() {
                    details.push(format!(
                        "{}: schema incompatible with deployed version under {:?} mode",
                        node.concept, mode
                    ));
                } else {
                    warnings.push(format!(
                        "{}: schema differs from deployed version",
                        node.concept
                    ));
                }
            }
        }

        if !details.is_empty() {
            warn!(plan = %plan, details = details.len(), "Schema validation failed");
            return ValidateOutcome::SchemaIncompatible { details };
        }

        self.set_phase(plan, PlanPhase::Validated);
        info!(plan = %plan, warnings = warnings.len(), "Plan validated");
        self.emit(KilnEvent::PlanValidated {
            plan: plan.clone(),
            warnings: warnings.clone(),
        });
        ValidateOutcome::Ok { warnings }
    }

    /// Phase, progress, and currently executing nodes.
    pub async fn status(&self, plan: &PlanId) -> StatusOutcome {
        match self.plans.get(plan.as_str()) {
            Some(record) => StatusOutcome::Ok {
                phase: record.phase,
                progress: record.progress(),
                active_nodes: self
                    .active_nodes
                    .get(plan.as_str())
                    .map(|nodes| nodes.clone())
                    .unwrap_or_default(),
            },
            None => StatusOutcome::NotFound,
        }
    }

    /// Read the full plan record.
    pub async fn get(&self, plan: &PlanId) -> Option<DeployPlan> {
        self.plans.get(plan.as_str())
    }

    /// Generate and apply infrastructure for a plan through an IaC backend.
    /// A successful apply pushes the stack teardown onto the plan's
    /// rollback stack.
    #[instrument(skip(self, emitter), fields(plan = %plan, backend = backend))]
    pub async fn provision_infra(
        &self,
        plan: &PlanId,
        backend: &str,
        options: &kiln_types::IacConfig,
        capabilities: &[String],
        emitter: &dyn Emitter,
    ) -> InfraOutcome {
        let Some(record) = self.plans.get(plan.as_str()) else {
            return InfraOutcome::NotFound;
        };
        let Some(provider) = self.registry.iac(backend) else {
            return InfraOutcome::UnknownBackend {
                backend: backend.to_string(),
            };
        };

        let generated = provider.generate(&record, options, emitter).await;
        match provider.apply(&generated.stack, capabilities).await {
            kiln_providers::ApplyOutcome::Ok { created, updated } => {
                let _ = self.plans.update(plan.as_str(), |p| {
                    p.rollback_stack.push(kiln_types::InverseOp::TeardownStack {
                        node: NodeId::new("infra"),
                        iac: backend.to_string(),
                        stack: generated.stack.clone(),
                    });
                    p.updated_at = chrono::Utc::now();
                });
                InfraOutcome::Ok {
                    stack: generated.stack,
                    files: generated.files,
                    created,
                    updated,
                }
            }
            kiln_providers::ApplyOutcome::InsufficientCapabilities { required } => {
                InfraOutcome::InsufficientCapabilities { required }
            }
            kiln_providers::ApplyOutcome::RolledBack { reason } => {
                InfraOutcome::RolledBack { reason }
            }
            kiln_providers::ApplyOutcome::NotFound => InfraOutcome::RolledBack {
                reason: format!("stack {} vanished before apply", generated.stack),
            },
        }
    }

    /// Emit GitOps manifests for a plan.
    #[instrument(skip(self, emitter), fields(plan = %plan, backend = backend))]
    pub async fn emit_gitops(
        &self,
        plan: &PlanId,
        backend: &str,
        repo: &str,
        path: &str,
        emitter: &dyn Emitter,
    ) -> GitOpsOutcome {
        let Some(record) = self.plans.get(plan.as_str()) else {
            return GitOpsOutcome::NotFound;
        };
        let Some(provider) = self.registry.gitops(backend) else {
            return GitOpsOutcome::UnknownBackend {
                backend: backend.to_string(),
            };
        };
        let emitted = provider.emit(&record, repo, path, emitter).await;
        GitOpsOutcome::Ok {
            manifest: emitted.manifest,
            files: emitted.files,
        }
    }

    pub(crate) fn set_phase(&self, plan: &PlanId, phase: PlanPhase) {
        let updated = self.plans.update(plan.as_str(), |record| {
            record.phase = phase;
            record.updated_at = chrono::Utc::now();
        });
        if updated.is_ok() {
            self.emit(KilnEvent::PlanPhaseChanged {
                plan: plan.clone(),
                phase,
            });
        }
    }

    pub(crate) fn emit(&self, event: KilnEvent) {
        let _ = self
            .event_tx
            .send(KilnEventEnvelope::new(event, EventSource::Planner));
    }
}
