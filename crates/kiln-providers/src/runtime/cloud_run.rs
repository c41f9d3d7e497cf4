//! Google Cloud Run runtime backend
//!
//! Services deploy from container images and serve at
//! `https://<service>-<hash>.<region>.run.app`.

use super::{
    ArtifactKind, DeployOutcome, DestroyOutcome, HealthOutcome, InstanceTable, ProvisionOutcome,
    RollbackOutcome, RuntimeProvider, SetWeightOutcome, validate_deploy,
};
use async_trait::async_trait;
use kiln_types::{IdSource, InstanceId, RuntimeConfig, RuntimeInstance};
use sha2::{Digest, Sha256};
use std::sync::Arc;

const MEMORY_FLOOR_MB: u32 = 128;

/// Google Cloud Run runtime provider.
pub struct CloudRunRuntime {
    table: InstanceTable,
}

impl CloudRunRuntime {
    /// Create a Cloud Run provider minting IDs from the given source.
    pub fn new(ids: Arc<dyn IdSource>) -> Self {
        Self {
            table: InstanceTable::new("cloud_run", ids),
        }
    }

    /// Cloud Run appends a stable per-service hash to the URL.
    fn service_url(concept: &str, config: &RuntimeConfig) -> String {
        let mut hasher = Sha256::new();
        hasher.update(concept.as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!(
            "https://{}-{}.{}.run.app",
            concept.to_lowercase(),
            &digest[..8],
            config.region
        )
    }
}

#[async_trait]
impl RuntimeProvider for CloudRunRuntime {
    fn type_name(&self) -> &'static str {
        "cloud_run"
    }

    async fn provision(&self, concept: &str, config: &RuntimeConfig) -> ProvisionOutcome {
        self.table
            .provision(concept, config, |_, concept, config| {
                Self::service_url(concept, config)
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
        self.table.health_check(instance, 30)
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
    async fn test_endpoint_follows_run_app_convention() {
        let run = CloudRunRuntime::new(Arc::new(MonotonicIdSource::new()));
        let config = RuntimeConfig {
            region: "europe-west1".to_string(),
            ..RuntimeConfig::default()
        };
        let outcome = run.provision("Catalog", &config).await;
        let endpoint = outcome.endpoint();
        assert!(endpoint.starts_with("https://catalog-"));
        assert!(endpoint.ends_with(".europe-west1.run.app"));

        // Same concept, same hash
        let again = run.provision("Catalog", &config).await;
        assert_eq!(endpoint, again.endpoint());
    }

    #[tokio::test]
    async fn test_deploy_requires_image_artifact() {
        let run = CloudRunRuntime::new(Arc::new(MonotonicIdSource::new()));
        let id = run
            .provision("Catalog", &RuntimeConfig::default())
            .await
            .instance()
            .clone();
        assert_eq!(
            run.deploy(&id, "s3://bucket/catalog.zip").await,
            DeployOutcome::RuntimeUnsupported
        );
        assert!(matches!(
            run.deploy(&id, "gcr.io/acme/catalog:1.0").await,
            DeployOutcome::Ok { .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_image_is_not_found() {
        let run = CloudRunRuntime::new(Arc::new(MonotonicIdSource::new()));
        let id = run
            .provision("Catalog", &RuntimeConfig::default())
            .await
            .instance()
            .clone();
        assert_eq!(
            run.deploy(&id, "ghost/catalog:1.0").await,
            DeployOutcome::ImageNotFound
        );
    }
}
