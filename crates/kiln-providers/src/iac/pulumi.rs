//! Pulumi IaC backend
//!
//! Generates a Pulumi project (`Pulumi.yaml`, per-environment stack config,
//! and a TypeScript program) and tracks stacks as
//! `kiln/<kit>/<environment>`.

use super::{
    ApplyOutcome, GeneratedStack, IacProvider, PreviewOutcome, StackTable, TeardownOutcome,
    plan_resources,
};
use crate::emitter::Emitter;
use async_trait::async_trait;
use kiln_types::{DeployPlan, IacConfig};

/// Flat per-resource cost estimate used by previews, in USD/month.
const RESOURCE_COST_USD: f64 = 4.5;

/// Pulumi IaC provider.
pub struct PulumiIac {
    table: StackTable,
}

impl PulumiIac {
    /// Create a Pulumi provider.
    pub fn new() -> Self {
        Self {
            table: StackTable::new("pulumi"),
        }
    }

    fn program_for(plan: &DeployPlan) -> String {
        let mut program = String::from("import * as pulumi from \"@pulumi/pulumi\";\n\n");
        for node in &plan.graph_nodes {
            program.push_str(&format!(
                "export const {} = new pulumi.CustomResource(\"{}/{}\", {{}});\n",
                node.concept.to_lowercase(),
                node.runtime,
                node.concept
            ));
        }
        program
    }
}

impl Default for PulumiIac {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IacProvider for PulumiIac {
    fn name(&self) -> &'static str {
        "pulumi"
    }

    async fn generate(
        &self,
        plan: &DeployPlan,
        options: &IacConfig,
        emitter: &dyn Emitter,
    ) -> GeneratedStack {
        let stack = format!("kiln/{}/{}", plan.manifest, plan.environment);
        let base = format!("iac/pulumi/{}", plan.id);
        let sources = vec![format!("plans/{}", plan.id)];

        let project = format!(
            "name: {}\nruntime: nodejs\nbackend:\n  url: {}\n",
            plan.manifest,
            options.backend_config.as_deref().unwrap_or("file://~")
        );
        let stack_config = format!("config:\n  aws:region: {}\n", plan
            .graph_nodes
            .first()
            .map(|n| n.config.region.as_str())
            .unwrap_or("us-east-1"));

        let files = vec![
            format!("{}/Pulumi.yaml", base),
            format!("{}/Pulumi.{}.yaml", base, plan.environment),
            format!("{}/index.ts", base),
        ];
        emitter.write(&files[0], &project, "yaml", &sources).await;
        emitter.write(&files[1], &stack_config, "yaml", &sources).await;
        emitter
            .write(&files[2], &Self::program_for(plan), "typescript", &sources)
            .await;

        self.table.record(
            &stack,
            plan,
            plan_resources(plan),
            Vec::new(),
            Some(RESOURCE_COST_USD),
        );
        GeneratedStack { stack, files }
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
