//! Vercel runtime backend
//!
//! Projects deploy from archives or script bundles and serve at
//! `https://<project>.vercel.app`.

use super::{
    ArtifactKind, DeployOutcome, DestroyOutcome, HealthOutcome, InstanceTable, ProvisionOutcome,
    RollbackOutcome, RuntimeProvider, SetWeightOutcome, validate_deploy,
};
use async_trait::async_trait;
use kiln_types::{IdSource, InstanceId, RuntimeConfig, RuntimeInstance};
use std::sync::Arc;

/// Vercel runtime provider.
pub struct VercelRuntime {
    table: InstanceTable,
}

impl VercelRuntime {
    /// Create a Vercel provider minting IDs from the given source.
    pub fn new(ids: Arc<dyn IdSource>) -> Self {
        Self {
            table: InstanceTable::new("vercel", ids),
        }
    }
}

#[async_trait]
impl RuntimeProvider for VercelRuntime {
    fn type_name(&self) -> &'static str {
        "vercel"
    }

    async fn provision(&self, concept: &str, config: &RuntimeConfig) -> ProvisionOutcome {
        self.table.provision(concept, config, |_, concept, _| {
            format!("https://{}.vercel.app", concept.to_lowercase())
        })
    }

    async fn deploy(&self, instance: &InstanceId, artifact: &str) -> DeployOutcome {
        self.table.deploy(instance, artifact, |artifact, config| {
            validate_deploy(
                &[ArtifactKind::Archive, ArtifactKind::Script],
                0,
                artifact,
                config,
            )
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
        self.table.health_check(instance, 40)
    }

    async fn get_instance(&self, instance: &InstanceId) -> Option<RuntimeInstance> {
        self.table.get(instance)
    }

    async fn find_instance(&self, concept: &str) -> Option<RuntimeInstance> {
        self.table.find_by_concept(concept)
    }
}
