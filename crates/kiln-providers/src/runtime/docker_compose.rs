//! Docker Compose runtime backend
//!
//! Services deploy from container images and address each other by service
//! name on the compose network: `http://<service>:<port>`.

use super::{
    ArtifactKind, DeployOutcome, DestroyOutcome, HealthOutcome, InstanceTable, ProvisionOutcome,
    RollbackOutcome, RuntimeProvider, SetWeightOutcome, validate_deploy,
};
use async_trait::async_trait;
use kiln_types::{IdSource, InstanceId, RuntimeConfig, RuntimeInstance};
use std::sync::Arc;
use std::time::Duration;

const MEMORY_FLOOR_MB: u32 = 32;
const SERVICE_PORT: u16 = 8080;

/// Docker Compose runtime provider.
pub struct DockerComposeRuntime {
    table: InstanceTable,
}

impl DockerComposeRuntime {
    /// Create a compose provider minting IDs from the given source.
    pub fn new(ids: Arc<dyn IdSource>) -> Self {
        Self {
            table: InstanceTable::new("docker_compose", ids),
        }
    }
}

#[async_trait]
impl RuntimeProvider for DockerComposeRuntime {
    fn type_name(&self) -> &'static str {
        "docker_compose"
    }

    fn estimate_node_duration(&self) -> Duration {
        Duration::from_secs(15)
    }

    async fn provision(&self, concept: &str, config: &RuntimeConfig) -> ProvisionOutcome {
        self.table.provision(concept, config, |_, concept, _| {
            format!("http://{}:{}", concept.to_lowercase(), SERVICE_PORT)
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
        self.table.health_check(instance, 5)
    }

    async fn get_instance(&self, instance: &InstanceId) -> Option<RuntimeInstance> {
        self.table.get(instance)
    }

    async fn find_instance(&self, concept: &str) -> Option<RuntimeInstance> {
        self.table.find_by_concept(concept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_types::MonotonicIdSource;

    #[tokio::test]
    async fn test_service_network_endpoint() {
        let compose = DockerComposeRuntime::new(Arc::new(MonotonicIdSource::new()));
        let outcome = compose.provision("Orders", &RuntimeConfig::default()).await;
        assert_eq!(outcome.endpoint(), "http://orders:8080");
    }

    #[tokio::test]
    async fn test_destroyed_instance_cannot_deploy() {
        let compose = DockerComposeRuntime::new(Arc::new(MonotonicIdSource::new()));
        let id = compose
            .provision("Orders", &RuntimeConfig::default())
            .await
            .instance()
            .clone();
        assert_eq!(compose.destroy(&id).await, DestroyOutcome::Ok);
        assert_eq!(
            compose.deploy(&id, "acme/orders:1.0").await,
            DeployOutcome::NotFound
        );
    }
}
