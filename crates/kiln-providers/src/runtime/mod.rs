//! Runtime provider family
//!
//! One contract over every runtime backend. Provision is idempotent keyed on
//! (concept, runtime type); deploy is history-preserving so rollback can pop
//! back to the previous version; every backend owns its own instance
//! relation and encodes its own endpoint-URL convention.
//!
//! The in-memory backends do not call real cloud APIs. Where a real backend
//! would surface registry or scheduler failures, these adapters derive the
//! outcome from the artifact reference and configuration: an image pulled
//! from a `flaky.` registry host backs off once before succeeding, an image
//! under `ghost/` does not exist, and a memory allocation below the
//! backend's floor is killed at startup.

pub mod cloud_functions;
pub mod cloud_run;
pub mod cloudflare;
pub mod docker_compose;
pub mod kubernetes;
pub mod lambda;
pub mod local;
pub mod vercel;

pub use cloud_functions::CloudFunctionsRuntime;
pub use cloud_run::CloudRunRuntime;
pub use cloudflare::CloudflareRuntime;
pub use docker_compose::DockerComposeRuntime;
pub use kubernetes::KubernetesRuntime;
pub use lambda::LambdaRuntime;
pub use local::LocalRuntime;
pub use vercel::VercelRuntime;

use async_trait::async_trait;
use dashmap::DashMap;
use kiln_store::Relation;
use kiln_types::{
    IdSource, InstanceId, InstanceStatus, RuntimeConfig, RuntimeInstance, SchemaMode, VersionEntry,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of `provision`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Fresh instance created
    Ok {
        instance: InstanceId,
        endpoint: String,
    },
    /// An instance already exists for this (concept, runtime type)
    AlreadyProvisioned {
        instance: InstanceId,
        endpoint: String,
    },
}

impl ProvisionOutcome {
    /// Instance ID regardless of variant.
    pub fn instance(&self) -> &InstanceId {
        match self {
            Self::Ok { instance, .. } | Self::AlreadyProvisioned { instance, .. } => instance,
        }
    }

    /// Endpoint regardless of variant.
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Ok { endpoint, .. } | Self::AlreadyProvisioned { endpoint, .. } => endpoint,
        }
    }
}

/// Outcome of `deploy`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Version deployed and serving
    Ok { endpoint: String, version: String },
    /// Artifact could not be built into a deployable unit
    BuildFailed { errors: Vec<String> },
    /// Image reference does not exist
    ImageNotFound,
    /// Registry transiently refused the pull; retryable
    ImagePullBackOff,
    /// Workload exceeded its memory allocation at startup
    OomKilled,
    /// This backend cannot run the given artifact kind
    RuntimeUnsupported,
    /// Unknown instance
    NotFound,
}

impl DeployOutcome {
    /// Whether the executor may retry this outcome once with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ImagePullBackOff)
    }
}

/// Outcome of `set_traffic_weight`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetWeightOutcome {
    /// Weight updated
    Ok {
        instance: InstanceId,
        new_weight: u32,
    },
    /// Weight outside `[0, 100]`
    InvalidWeight,
    /// Unknown instance
    NotFound,
}

/// Outcome of `rollback`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// Reverted to the previous version
    Ok { previous_version: String },
    /// Nothing to revert to
    NoHistory,
    /// Rollback could not complete
    Failed { reason: String },
}

/// Outcome of `destroy`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestroyOutcome {
    /// Instance terminated
    Ok,
    /// Termination failed
    Failed { reason: String },
}

/// Outcome of `health_check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthOutcome {
    /// Endpoint responded
    Ok { latency_ms: u64 },
    /// Endpoint did not respond
    Unreachable,
}

/// Uniform contract over runtime backends.
#[async_trait]
pub trait RuntimeProvider: Send + Sync {
    /// Backend name used in manifests and the provider registry.
    fn type_name(&self) -> &'static str;

    /// Per-node execution time estimate used by the planner.
    fn estimate_node_duration(&self) -> Duration {
        Duration::from_secs(60)
    }

    /// Create the deployment target for a concept. Idempotent keyed on
    /// (concept, runtime type): the second caller observes
    /// `AlreadyProvisioned`.
    async fn provision(&self, concept: &str, config: &RuntimeConfig) -> ProvisionOutcome;

    /// Deploy an artifact to an instance. The previous current version is
    /// pushed onto history before overwrite.
    async fn deploy(&self, instance: &InstanceId, artifact: &str) -> DeployOutcome;

    /// Shift the traffic weight served by an instance.
    async fn set_traffic_weight(&self, instance: &InstanceId, weight: u32) -> SetWeightOutcome;

    /// Revert to the previous version by popping history.
    async fn rollback(&self, instance: &InstanceId) -> RollbackOutcome;

    /// Terminate an instance.
    async fn destroy(&self, instance: &InstanceId) -> DestroyOutcome;

    /// Probe the instance endpoint.
    async fn health_check(&self, instance: &InstanceId) -> HealthOutcome;

    /// Whether `new_schema` is compatible with `old_schema` under `mode`.
    ///
    /// Schemas are JSON objects mapping field name to type name.
    async fn check_schema(&self, old_schema: &str, new_schema: &str, mode: SchemaMode) -> bool {
        schemas_compatible(old_schema, new_schema, mode)
    }

    /// Read an instance record.
    async fn get_instance(&self, instance: &InstanceId) -> Option<RuntimeInstance>;

    /// Find the instance provisioned for a concept, if any.
    async fn find_instance(&self, concept: &str) -> Option<RuntimeInstance>;
}

/// Classification of an artifact reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArtifactKind {
    /// Archive (`s3://...`, `*.zip`, `*.tar.gz`)
    Archive,
    /// Container image (`repo/name:tag`)
    Image,
    /// Script bundle (`*.js`, `*.mjs`, `*.wasm`)
    Script,
    /// Anything else
    Other,
}

pub(crate) fn artifact_kind(reference: &str) -> ArtifactKind {
    if reference.starts_with("s3://")
        || reference.ends_with(".zip")
        || reference.ends_with(".tar.gz")
    {
        ArtifactKind::Archive
    } else if reference.ends_with(".js")
        || reference.ends_with(".mjs")
        || reference.ends_with(".wasm")
    {
        ArtifactKind::Script
    } else if reference.contains(':') && !reference.contains("://") {
        ArtifactKind::Image
    } else {
        ArtifactKind::Other
    }
}

/// JSON-object schema compatibility.
///
/// `Backward`: every old field survives with its type (additions allowed).
/// `Forward`: no additions (removals allowed). `Full`: both. Unparseable
/// schemas are compatible only when byte-identical; an empty old schema is
/// compatible with anything.
pub fn schemas_compatible(old_schema: &str, new_schema: &str, mode: SchemaMode) -> bool {
    if matches!(mode, SchemaMode::None) || old_schema.trim().is_empty() {
        return true;
    }
    let old: serde_json::Map<String, serde_json::Value> =
        match serde_json::from_str(old_schema) {
            Ok(map) => map,
            Err(_) => return old_schema == new_schema,
        };
    let new: serde_json::Map<String, serde_json::Value> =
        match serde_json::from_str(new_schema) {
            Ok(map) => map,
            Err(_) => return old_schema == new_schema,
        };

    let backward = old.iter().all(|(field, ty)| new.get(field) == Some(ty));
    let forward = new.iter().all(|(field, ty)| old.get(field) == Some(ty));

    match mode {
        SchemaMode::Backward => backward,
        SchemaMode::Forward => forward,
        SchemaMode::Full => backward && forward,
        SchemaMode::None => true,
    }
}

/// Shared instance state machine for runtime backends.
///
/// Owns the backend's instance relation plus the secondary indexes that make
/// provisioning idempotent. Backends layer naming, endpoint construction,
/// and deploy validation on top.
pub(crate) struct InstanceTable {
    runtime_type: &'static str,
    instances: Relation<RuntimeInstance>,
    by_concept: DashMap<String, InstanceId>,
    configs: DashMap<String, RuntimeConfig>,
    pull_attempts: DashMap<String, u32>,
    ids: Arc<dyn IdSource>,
}

impl InstanceTable {
    pub(crate) fn new(runtime_type: &'static str, ids: Arc<dyn IdSource>) -> Self {
        Self {
            runtime_type,
            instances: Relation::new(runtime_type),
            by_concept: DashMap::new(),
            configs: DashMap::new(),
            pull_attempts: DashMap::new(),
            ids,
        }
    }

    /// Idempotent provision. `make_endpoint` sees (instance id, concept,
    /// config) and returns the backend's endpoint URL.
    pub(crate) fn provision(
        &self,
        concept: &str,
        config: &RuntimeConfig,
        make_endpoint: impl FnOnce(&str, &str, &RuntimeConfig) -> String,
    ) -> ProvisionOutcome {
        // The concept index entry is the serialization point: racing
        // provisions for the same concept resolve to one record.
        match self.by_concept.entry(concept.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                let instance_id = entry.get().clone();
                let endpoint = self
                    .instances
                    .get(instance_id.as_str())
                    .map(|i| i.endpoint)
                    .unwrap_or_default();
                debug!(
                    concept = concept,
                    runtime = self.runtime_type,
                    instance = %instance_id,
                    "Provision found existing instance"
                );
                ProvisionOutcome::AlreadyProvisioned {
                    instance: instance_id,
                    endpoint,
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let id = InstanceId::new(self.ids.next_id(self.runtime_type));
                let endpoint = make_endpoint(id.as_str(), concept, config);
                let now = chrono::Utc::now();
                let instance = RuntimeInstance {
                    id: id.clone(),
                    concept: concept.to_string(),
                    runtime_type: self.runtime_type.to_string(),
                    endpoint: endpoint.clone(),
                    current_version: None,
                    current_artifact: None,
                    traffic_weight: 0,
                    status: InstanceStatus::Provisioned,
                    history: Vec::new(),
                    created_at: now,
                    updated_at: now,
                };
                self.instances.put(id.as_str(), instance);
                self.configs.insert(id.as_str().to_string(), config.clone());
                entry.insert(id.clone());
                info!(
                    concept = concept,
                    runtime = self.runtime_type,
                    instance = %id,
                    endpoint = %endpoint,
                    "Instance provisioned"
                );
                ProvisionOutcome::Ok {
                    instance: id,
                    endpoint,
                }
            }
        }
    }

    /// History-preserving deploy. `validate` may veto with a failure
    /// outcome before any state changes.
    pub(crate) fn deploy(
        &self,
        instance: &InstanceId,
        artifact: &str,
        validate: impl FnOnce(&str, &RuntimeConfig) -> Option<DeployOutcome>,
    ) -> DeployOutcome {
        let config = self
            .configs
            .get(instance.as_str())
            .map(|c| c.clone())
            .unwrap_or_default();

        if let Some(veto) = validate(artifact, &config) {
            warn!(
                instance = %instance,
                runtime = self.runtime_type,
                outcome = ?veto,
                "Deploy rejected"
            );
            return veto;
        }

        if artifact_kind(artifact) == ArtifactKind::Image && self.backoff_once(instance, artifact) {
            return DeployOutcome::ImagePullBackOff;
        }

        let updated = self.instances.update(instance.as_str(), |record| {
            if record.status == InstanceStatus::Destroyed {
                return None;
            }
            let version = record.next_version_label();
            if let Some(previous) = record.current_version.take() {
                record.history.push(VersionEntry {
                    version: previous,
                    artifact: record.current_artifact.take().unwrap_or_default(),
                    deployed_at: record.updated_at,
                });
            }
            record.current_version = Some(version.clone());
            record.current_artifact = Some(artifact.to_string());
            record.status = InstanceStatus::Deployed;
            record.updated_at = chrono::Utc::now();
            Some((record.endpoint.clone(), version))
        });

        match updated {
            Ok(Some((endpoint, version))) => {
                info!(
                    instance = %instance,
                    runtime = self.runtime_type,
                    version = %version,
                    "Artifact deployed"
                );
                DeployOutcome::Ok { endpoint, version }
            }
            Ok(None) | Err(_) => DeployOutcome::NotFound,
        }
    }

    /// Whether this (instance, artifact) pull should back off. Images from a
    /// `flaky.` registry host fail exactly once, then succeed.
    fn backoff_once(&self, instance: &InstanceId, artifact: &str) -> bool {
        if !artifact.starts_with("flaky.") {
            return false;
        }
        let key = format!("{}/{}", instance, artifact);
        let mut attempts = self.pull_attempts.entry(key).or_insert(0);
        *attempts += 1;
        *attempts == 1
    }

    pub(crate) fn set_traffic_weight(
        &self,
        instance: &InstanceId,
        weight: u32,
    ) -> SetWeightOutcome {
        if weight > 100 {
            return SetWeightOutcome::InvalidWeight;
        }
        match self.instances.update(instance.as_str(), |record| {
            record.traffic_weight = weight;
            record.updated_at = chrono::Utc::now();
        }) {
            Ok(()) => SetWeightOutcome::Ok {
                instance: instance.clone(),
                new_weight: weight,
            },
            Err(_) => SetWeightOutcome::NotFound,
        }
    }

    pub(crate) fn rollback(&self, instance: &InstanceId) -> RollbackOutcome {
        let result = self.instances.update(instance.as_str(), |record| {
            if record.status == InstanceStatus::Destroyed {
                return Err("instance is destroyed".to_string());
            }
            match record.history.pop() {
                Some(entry) => {
                    record.current_version = Some(entry.version.clone());
                    record.current_artifact = Some(entry.artifact);
                    record.updated_at = chrono::Utc::now();
                    Ok(entry.version)
                }
                None => Err(String::new()),
            }
        });

        match result {
            Ok(Ok(previous_version)) => {
                info!(
                    instance = %instance,
                    runtime = self.runtime_type,
                    version = %previous_version,
                    "Rolled back to previous version"
                );
                RollbackOutcome::Ok { previous_version }
            }
            Ok(Err(reason)) if reason.is_empty() => RollbackOutcome::NoHistory,
            Ok(Err(reason)) => RollbackOutcome::Failed { reason },
            Err(_) => RollbackOutcome::Failed {
                reason: format!("unknown instance {}", instance),
            },
        }
    }

    pub(crate) fn destroy(&self, instance: &InstanceId) -> DestroyOutcome {
        let result = self.instances.update(instance.as_str(), |record| {
            record.status = InstanceStatus::Destroyed;
            record.traffic_weight = 0;
            record.updated_at = chrono::Utc::now();
            record.concept.clone()
        });
        match result {
            Ok(concept) => {
                self.by_concept.remove(&concept);
                info!(
                    instance = %instance,
                    runtime = self.runtime_type,
                    "Instance destroyed"
                );
                DestroyOutcome::Ok
            }
            Err(_) => DestroyOutcome::Failed {
                reason: format!("unknown instance {}", instance),
            },
        }
    }

    /// Health check with a deterministic per-backend base latency. Only a
    /// deployed instance is reachable.
    pub(crate) fn health_check(&self, instance: &InstanceId, base_latency_ms: u64) -> HealthOutcome {
        match self.instances.get(instance.as_str()) {
            Some(record) if record.status == InstanceStatus::Deployed => HealthOutcome::Ok {
                latency_ms: base_latency_ms + (instance.as_str().len() as u64 % 7),
            },
            _ => HealthOutcome::Unreachable,
        }
    }

    pub(crate) fn get(&self, instance: &InstanceId) -> Option<RuntimeInstance> {
        self.instances.get(instance.as_str())
    }

    pub(crate) fn find_by_concept(&self, concept: &str) -> Option<RuntimeInstance> {
        self.by_concept
            .get(concept)
            .and_then(|id| self.instances.get(id.as_str()))
    }
}

/// Shared deploy validation for backends.
///
/// Vetoes empty references, artifact kinds the backend cannot run, missing
/// images, and allocations below the backend's memory floor.
pub(crate) fn validate_deploy(
    allowed: &[ArtifactKind],
    memory_floor_mb: u32,
    artifact: &str,
    config: &RuntimeConfig,
) -> Option<DeployOutcome> {
    if artifact.trim().is_empty() {
        return Some(DeployOutcome::BuildFailed {
            errors: vec!["artifact reference is empty".to_string()],
        });
    }
    let kind = artifact_kind(artifact);
    if !allowed.contains(&kind) {
        return Some(DeployOutcome::RuntimeUnsupported);
    }
    if kind == ArtifactKind::Image && (artifact.starts_with("ghost/") || artifact.contains("/ghost/"))
    {
        return Some(DeployOutcome::ImageNotFound);
    }
    if config.memory_mb < memory_floor_mb {
        return Some(DeployOutcome::OomKilled);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_types::MonotonicIdSource;

    fn table() -> InstanceTable {
        InstanceTable::new("lambda", Arc::new(MonotonicIdSource::new()))
    }

    #[test]
    fn test_artifact_kind_classification() {
        assert_eq!(artifact_kind("s3://bucket/user.zip"), ArtifactKind::Archive);
        assert_eq!(artifact_kind("ghcr.io/acme/cart:1.2"), ArtifactKind::Image);
        assert_eq!(artifact_kind("worker.js"), ArtifactKind::Script);
        assert_eq!(artifact_kind("something-else"), ArtifactKind::Other);
    }

    #[test]
    fn test_provision_is_idempotent_per_concept() {
        let table = table();
        let config = RuntimeConfig::default();
        let first = table.provision("User", &config, |id, _, _| format!("https://{}", id));
        let second = table.provision("User", &config, |id, _, _| format!("https://{}", id));

        assert!(matches!(first, ProvisionOutcome::Ok { .. }));
        assert!(matches!(second, ProvisionOutcome::AlreadyProvisioned { .. }));
        assert_eq!(first.instance(), second.instance());
        assert_eq!(table.instances.len(), 1);
    }

    #[test]
    fn test_deploy_preserves_history_and_rollback_pops() {
        let table = table();
        let outcome = table.provision("User", &RuntimeConfig::default(), |_, _, _| {
            "https://endpoint".to_string()
        });
        let id = outcome.instance().clone();

        let first = table.deploy(&id, "s3://bucket/user-v1.zip", |_, _| None);
        assert!(matches!(first, DeployOutcome::Ok { ref version, .. } if version == "v1"));

        let second = table.deploy(&id, "s3://bucket/user-v2.zip", |_, _| None);
        assert!(matches!(second, DeployOutcome::Ok { ref version, .. } if version == "v2"));

        let record = table.get(&id).unwrap();
        assert_eq!(record.current_version.as_deref(), Some("v2"));
        assert_eq!(record.history.len(), 1);
        assert_eq!(record.history[0].version, "v1");

        let rolled = table.rollback(&id);
        assert_eq!(
            rolled,
            RollbackOutcome::Ok {
                previous_version: "v1".to_string()
            }
        );
        let record = table.get(&id).unwrap();
        assert_eq!(record.current_version.as_deref(), Some("v1"));
        assert!(record.history.is_empty());

        assert_eq!(table.rollback(&id), RollbackOutcome::NoHistory);
    }

    #[test]
    fn test_flaky_registry_backs_off_once() {
        let table = table();
        let outcome = table.provision("Cart", &RuntimeConfig::default(), |_, _, _| {
            "https://endpoint".to_string()
        });
        let id = outcome.instance().clone();

        let first = table.deploy(&id, "flaky.registry/acme/cart:1.0", |_, _| None);
        assert_eq!(first, DeployOutcome::ImagePullBackOff);

        let second = table.deploy(&id, "flaky.registry/acme/cart:1.0", |_, _| None);
        assert!(matches!(second, DeployOutcome::Ok { .. }));
    }

    #[test]
    fn test_destroy_frees_the_concept_key() {
        let table = table();
        let outcome = table.provision("User", &RuntimeConfig::default(), |_, _, _| {
            "https://endpoint".to_string()
        });
        let id = outcome.instance().clone();

        assert_eq!(table.destroy(&id), DestroyOutcome::Ok);
        assert!(table.find_by_concept("User").is_none());

        let fresh = table.provision("User", &RuntimeConfig::default(), |_, _, _| {
            "https://endpoint-2".to_string()
        });
        assert!(matches!(fresh, ProvisionOutcome::Ok { .. }));
        assert_ne!(fresh.instance(), &id);
    }

    #[test]
    fn test_health_check_requires_deployed_status() {
        let table = table();
        let outcome = table.provision("User", &RuntimeConfig::default(), |_, _, _| {
            "https://endpoint".to_string()
        });
        let id = outcome.instance().clone();

        assert_eq!(table.health_check(&id, 10), HealthOutcome::Unreachable);
        table.deploy(&id, "s3://bucket/user.zip", |_, _| None);
        assert!(matches!(
            table.health_check(&id, 10),
            HealthOutcome::Ok { .. }
        ));
    }

    #[test]
    fn test_schema_compatibility_modes() {
        let v1 = r#"{"id": "string", "name": "string"}"#;
        let v2 = r#"{"id": "string", "name": "string", "email": "string"}"#;
        let v3 = r#"{"id": "string"}"#;

        // Additive change: backward-compatible, not forward
        assert!(schemas_compatible(v1, v2, SchemaMode::Backward));
        assert!(!schemas_compatible(v1, v2, SchemaMode::Forward));
        assert!(!schemas_compatible(v1, v2, SchemaMode::Full));

        // Removal: forward-compatible, not backward
        assert!(!schemas_compatible(v1, v3, SchemaMode::Backward));
        assert!(schemas_compatible(v1, v3, SchemaMode::Forward));

        // Identical: full
        assert!(schemas_compatible(v1, v1, SchemaMode::Full));

        // No requirement
        assert!(schemas_compatible(v1, v3, SchemaMode::None));
    }

    #[test]
    fn test_validate_deploy_vetoes() {
        let config = RuntimeConfig::default();
        let allowed = [ArtifactKind::Image];

        assert!(matches!(
            validate_deploy(&allowed, 64, "", &config),
            Some(DeployOutcome::BuildFailed { .. })
        ));
        assert_eq!(
            validate_deploy(&allowed, 64, "s3://bucket/user.zip", &config),
            Some(DeployOutcome::RuntimeUnsupported)
        );
        assert_eq!(
            validate_deploy(&allowed, 64, "ghost/cart:1.0", &config),
            Some(DeployOutcome::ImageNotFound)
        );

        let tiny = RuntimeConfig {
            memory_mb: 32,
            ..RuntimeConfig::default()
        };
        assert_eq!(
            validate_deploy(&allowed, 64, "acme/cart:1.0", &tiny),
            Some(DeployOutcome::OomKilled)
        );

        assert_eq!(validate_deploy(&allowed, 64, "acme/cart:1.0", &config), None);
    }
}
