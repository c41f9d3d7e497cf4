//! AWS Lambda runtime backend
//!
//! Functions deploy from archive artifacts (`s3://` or `.zip`) and serve
//! through Lambda function URLs: `https://<fn>.lambda-url.<region>.on.aws`.

use super::{
    ArtifactKind, DeployOutcome, DestroyOutcome, HealthOutcome, InstanceTable, ProvisionOutcome,
    RollbackOutcome, RuntimeProvider, SetWeightOutcome, validate_deploy,
};
use async_trait::async_trait;
use kiln_types::{IdSource, InstanceId, RuntimeConfig, RuntimeInstance};
use std::sync::Arc;
use std::time::Duration;

/// Lambda requires at least 128 MB per function.
const MEMORY_FLOOR_MB: u32 = 128;

/// AWS Lambda runtime provider.
pub struct LambdaRuntime {
    table: InstanceTable,
}

impl LambdaRuntime {
    /// Create a Lambda provider minting IDs from the given source.
    pub fn new(ids: Arc<dyn IdSource>) -> Self {
        Self {
            table: InstanceTable::new("lambda", ids),
        }
    }

    fn function_url(concept: &str, config: &RuntimeConfig) -> String {
        format!(
            "https://{}.lambda-url.{}.on.aws",
            concept.to_lowercase(),
            config.region
        )
    }
}

#[async_trait]
impl RuntimeProvider for LambdaRuntime {
    fn type_name(&self) -> &'static str {
        "lambda"
    }

    fn estimate_node_duration(&self) -> Duration {
        Duration::from_secs(45)
    }

    async fn provision(&self, concept: &str, config: &RuntimeConfig) -> ProvisionOutcome {
        self.table
            .provision(concept, config, |_, concept, config| {
                Self::function_url(concept, config)
            })
    }

    async fn deploy(&self, instance: &InstanceId, artifact: &str) -> DeployOutcome {
        self.table.deploy(instance, artifact, |artifact, config| {
            validate_deploy(&[ArtifactKind::Archive], MEMORY_FLOOR_MB, artifact, config)
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
        self.table.health_check(instance, 25)
    }

    async fn get_instance(&self, instance: &InstanceId) -> Option<RuntimeInstance> {
        self.table.get(instance)
    }

    async fn find_instance(&self, concept: &str) -> Option<RuntimeInstance> {
        self.table.find_by_concept(concept)
    }
}
