//! Google Cloud Functions runtime backend
//!
//! Functions serve at
//! `https://<region>-<project>.cloudfunctions.net/<fn>`.

use super::{
    ArtifactKind, DeployOutcome, DestroyOutcome, HealthOutcome, InstanceTable, ProvisionOutcome,
    RollbackOutcome, RuntimeProvider, SetWeightOutcome, validate_deploy,
};
use async_trait::async_trait;
use kiln_types::{IdSource, InstanceId, RuntimeConfig, RuntimeInstance};
use std::sync::Arc;

const MEMORY_FLOOR_MB: u32 = 128;

/// Google Cloud Functions runtime provider.
pub struct CloudFunctionsRuntime {
    table: InstanceTable,
    project: String,
}

impl CloudFunctionsRuntime {
    /// Create a provider for the default `kiln-platform` project.
    pub fn new(ids: Arc<dyn IdSource>) -> Self {
        Self::with_project(ids, "kiln-platform")
    }

    /// Create a provider for a specific GCP project.
    pub fn with_project(ids: Arc<dyn IdSource>, project: impl Into<String>) -> Self {
        Self {
            table: InstanceTable::new("cloud_functions", ids),
            project: project.into(),
        }
    }
}

#[async_trait]
impl RuntimeProvider for CloudFunctionsRuntime {
    fn type_name(&self) -> &'static str {
        "cloud_functions"
    }

    async fn provision(&self, concept: &str, config: &RuntimeConfig) -> ProvisionOutcome {
        let project = self.project.clone();
        self.table.provision(concept, config, |_, concept, config| {
            format!(
                "https://{}-{}.cloudfunctions.net/{}",
                config.region,
                project,
                concept.to_lowercase()
            )
        })
    }

    async fn deploy(&self, instance: &InstanceId, artifact: &str) -> DeployOutcome {
        self.table.deploy(instance, artifact, |artifact, config| {
            validate_deploy(
                &[ArtifactKind::Archive, ArtifactKind::Script],
                MEMORY_FLOOR_MB,
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
        self.table.health_check(instance, 35)
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
    async fn test_function_endpoint_convention() {
        let gcf =
            CloudFunctionsRuntime::with_project(Arc::new(MonotonicIdSource::new()), "acme-prod");
        let config = RuntimeConfig {
            region: "us-central1".to_string(),
            ..RuntimeConfig::default()
        };
        let outcome = gcf.provision("Mailer", &config).await;
        assert_eq!(
            outcome.endpoint(),
            "https://us-central1-acme-prod.cloudfunctions.net/mailer"
        );
    }
}
