//! Docker Compose IaC backend
//!
//! Generates one compose file per plan; the stack handle is the compose
//! project name.

use super::{
    ApplyOutcome, GeneratedStack, IacProvider, PreviewOutcome, StackTable, TeardownOutcome,
    plan_resources,
};
use crate::emitter::Emitter;
use async_trait::async_trait;
use kiln_types::{DeployPlan, IacConfig};

/// Docker Compose IaC provider.
pub struct DockerComposeIac {
    table: StackTable,
}

impl DockerComposeIac {
    /// Create a compose provider.
    pub fn new() -> Self {
        Self {
            table: StackTable::new("docker_compose_iac"),
        }
    }

    fn compose_file_for(plan: &DeployPlan) -> String {
        let mut compose = String::from("services:\n");
        for node in &plan.graph_nodes {
            compose.push_str(&format!(
                "  {}:\n    image: kiln/{}:latest\n    mem_limit: {}m\n",
                node.concept.to_lowercase(),
                node.concept.to_lowercase(),
                node.config.memory_mb
            ));
        }
        compose
    }
}

impl Default for DockerComposeIac {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IacProvider for DockerComposeIac {
    fn name(&self) -> &'static str {
        "docker_compose"
    }

    async fn generate(
        &self,
        plan: &DeployPlan,
        _options: &IacConfig,
        emitter: &dyn Emitter,
    ) -> GeneratedStack {
        let stack = plan.manifest.clone();
        let path = format!("iac/compose/{}/docker-compose.yaml", plan.id);
        emitter
            .write(
                &path,
                &Self::compose_file_for(plan),
                "yaml",
                &[format!("plans/{}", plan.id)],
            )
            .await;

        self.table
            .record(&stack, plan, plan_resources(plan), Vec::new(), None);
        GeneratedStack {
            stack,
            files: vec![path],
        }
    }

    async fn preview(&self, stack: &str) -> PreviewOutcome {
        self.table.preview(stack)
    }

    async fn apply(&self, stack: &str, capabilities: &[String]) -> ApplyOutcome {
        self.table.apply(stack, capabilities)
    }

    async fn teardown(&self, stack: &str) -> TeardownOutcome {
        self.table.teardown(stack)
    }
}
