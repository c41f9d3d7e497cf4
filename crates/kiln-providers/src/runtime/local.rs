//! Local process runtime backend
//!
//! Development target: any artifact kind, loopback endpoints with a stable
//! per-concept port.

use super::{
    DeployOutcome, DestroyOutcome, HealthOutcome, InstanceTable, ProvisionOutcome,
    RollbackOutcome, RuntimeProvider, SetWeightOutcome,
};
use async_trait::async_trait;
use kiln_types::{IdSource, InstanceId, RuntimeConfig, RuntimeInstance};
use std::sync::Arc;
use std::time::Duration;

/// Local process runtime provider.
pub struct LocalRuntime {
    table: InstanceTable,
}

impl LocalRuntime {
    /// Create a local provider minting IDs from the given source.
    pub fn new(ids: Arc<dyn IdSource>) -> Self {
        Self {
            table: InstanceTable::new("local", ids),
        }
    }

    /// Stable port in `[8000, 8999]` derived from the concept name.
    fn port_for(concept: &str) -> u16 {
        let sum: u32 = concept.bytes().map(u32::from).sum();
        8000 + (sum % 1000) as u16
    }
}

#[async_trait]
impl RuntimeProvider for LocalRuntime {
    fn type_name(&self) -> &'static str {
        "local"
    }

    fn estimate_node_duration(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn provision(&self, concept: &str, config: &RuntimeConfig) -> ProvisionOutcome {
        self.table.provision(concept, config, |_, concept, _| {
            format!("http://127.0.0.1:{}", Self::port_for(concept))
        })
    }

    async fn deploy(&self, instance: &InstanceId, artifact: &str) -> DeployOutcome {
        // Local runs anything that names an artifact at all.
        self.table.deploy(instance, artifact, |artifact, _| {
            if artifact.trim().is_empty() {
                Some(DeployOutcome::BuildFailed {
                    errors: vec!["artifact reference is empty".to_string()],
                })
            } else {
                None
            }
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
        self.table.health_check(instance, 1)
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
    async fn test_stable_port_per_concept() {
        let local = LocalRuntime::new(Arc::new(MonotonicIdSource::new()));
        let a = local.provision("User", &RuntimeConfig::default()).await;
        let b = local.provision("User", &RuntimeConfig::default()).await;
        assert_eq!(a.endpoint(), b.endpoint());
        assert!(a.endpoint().starts_with("http://127.0.0.1:8"));
    }

    #[tokio::test]
    async fn test_accepts_any_artifact_kind() {
        let local = LocalRuntime::new(Arc::new(MonotonicIdSource::new()));
        let id = local
            .provision("User", &RuntimeConfig::default())
            .await
            .instance()
            .clone();
        assert!(matches!(
            local.deploy(&id, "target/debug/user").await,
            DeployOutcome::Ok { .. }
        ));
    }
}
