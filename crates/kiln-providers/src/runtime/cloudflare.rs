//! Cloudflare Workers runtime backend
//!
//! Workers deploy from script bundles and serve at
//! `https://<script>.<account>.workers.dev`.

use super::{
    ArtifactKind, DeployOutcome, DestroyOutcome, HealthOutcome, InstanceTable, ProvisionOutcome,
    RollbackOutcome, RuntimeProvider, SetWeightOutcome, validate_deploy,
};
use async_trait::async_trait;
use kiln_types::{IdSource, InstanceId, RuntimeConfig, RuntimeInstance};
use std::sync::Arc;
use std::time::Duration;

/// Cloudflare Workers runtime provider.
pub struct CloudflareRuntime {
    table: InstanceTable,
    account: String,
}

impl CloudflareRuntime {
    /// Create a provider for the default `kiln` account.
    pub fn new(ids: Arc<dyn IdSource>) -> Self {
        Self::with_account(ids, "kiln")
    }

    /// Create a provider for a specific account subdomain.
    pub fn with_account(ids: Arc<dyn IdSource>, account: impl Into<String>) -> Self {
        Self {
            table: InstanceTable::new("cloudflare", ids),
            account: account.into(),
        }
    }
}

#[async_trait]
impl RuntimeProvider for CloudflareRuntime {
    fn type_name(&self) -> &'static str {
        "cloudflare"
    }

    fn estimate_node_duration(&self) -> Duration {
        Duration::from_secs(20)
    }

    async fn provision(&self, concept: &str, config: &RuntimeConfig) -> ProvisionOutcome {
        let account = self.account.clone();
        self.table.provision(concept, config, |_, concept, _| {
            format!(
                "https://{}.{}.workers.dev",
                concept.to_lowercase(),
                account
            )
        })
    }

    async fn deploy(&self, instance: &InstanceId, artifact: &str) -> DeployOutcome {
        self.table.deploy(instance, artifact, |artifact, config| {
            validate_deploy(&[ArtifactKind::Script], 0, artifact, config)
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
        self.table.health_check(instance, 10)
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
    async fn test_workers_dev_endpoint_and_script_only() {
        let workers =
            CloudflareRuntime::with_account(Arc::new(MonotonicIdSource::new()), "acme-42");
        let outcome = workers.provision("Edge", &RuntimeConfig::default()).await;
        assert_eq!(outcome.endpoint(), "https://edge.acme-42.workers.dev");

        let id = outcome.instance().clone();
        assert!(matches!(
            workers.deploy(&id, "edge.mjs").await,
            DeployOutcome::Ok { .. }
        ));
        assert_eq!(
            workers.deploy(&id, "s3://bucket/edge.zip").await,
            DeployOutcome::RuntimeUnsupported
        );
    }
}
