//! Kubernetes runtime backend
//!
//! Deployments serve through cluster-local services:
//! `http://<svc>.<namespace>.svc.cluster.local`.

use super::{
    ArtifactKind, DeployOutcome, DestroyOutcome, HealthOutcome, InstanceTable, ProvisionOutcome,
    RollbackOutcome, RuntimeProvider, SetWeightOutcome, validate_deploy,
};
use async_trait::async_trait;
use kiln_types::{IdSource, InstanceId, RuntimeConfig, RuntimeInstance};
use std::sync::Arc;

const MEMORY_FLOOR_MB: u32 = 64;

/// Kubernetes runtime provider.
pub struct KubernetesRuntime {
    table: InstanceTable,
    namespace: String,
}

impl KubernetesRuntime {
    /// Create a provider deploying into the default `kiln` namespace.
    pub fn new(ids: Arc<dyn IdSource>) -> Self {
        Self::with_namespace(ids, "kiln")
    }

    /// Create a provider deploying into a specific namespace.
    pub fn with_namespace(ids: Arc<dyn IdSource>, namespace: impl Into<String>) -> Self {
        Self {
            table: InstanceTable::new("kubernetes", ids),
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl RuntimeProvider for KubernetesRuntime {
    fn type_name(&self) -> &'static str {
        "kubernetes"
    }

    async fn provision(&self, concept: &str, config: &RuntimeConfig) -> ProvisionOutcome {
        let namespace = self.namespace.clone();
        self.table.provision(concept, config, |_, concept, _| {
            format!(
                "http://{}.{}.svc.cluster.local",
                concept.to_lowercase(),
                namespace
            )
        })
    }

    async fn deploy(&self, instance: &InstanceId, artifact: &str) -> DeployOutcome {
        self.table.deploy(instance, artifact, |artifact, config| {
            validate_deploy(&[ArtifactKind::Image], MEMORY_FLOOR_MB, artifact, config)
        })
    }

    async fn set_traffic_weight(&self, instance: &InstanceId, weight: u32) -> SetWeightOutcome {
        self.table.set_traffic_weight(instance, weight)
    }

    async fn rollback(&self, instance: &InstanceId) -> RollbackOutcome {
        self.table.rollback(instance)
    }

    async fn destroy(&self, instance: &InstanceId) -> DestroyOutcome {
        self.table.destroy(instance)
    }

    async fn health_check(&self, instance: &InstanceId) -> HealthOutcome {
        self.table.health_check(instance, 15)
    }

    async fn get_instance(&self, instance: &InstanceId) -> Option<RuntimeInstance> {
        self.table.get(instance)
    }

    async fn find_instance(&self, concept: &str) -> Option<RuntimeInstance> {
        self.table.find_by_concept(concept)
    }
}
