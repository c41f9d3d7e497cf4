//! AWS CloudFormation IaC backend
//!
//! Generates a template per plan and tracks required capabilities: apply is
//! rejected with `InsufficientCapabilities` unless the caller's grants cover
//! everything the template needs. Any node that reads from a secret
//! provider pulls in `CAPABILITY_IAM` for its execution role.

use super::{
    ApplyOutcome, GeneratedStack, IacProvider, PreviewOutcome, StackTable, TeardownOutcome,
    plan_resources,
};
use crate::emitter::Emitter;
use async_trait::async_trait;
use kiln_types::{DeployPlan, IacConfig};
use serde_json::json;

/// AWS CloudFormation IaC provider.
pub struct CloudFormationIac {
    table: StackTable,
}

impl CloudFormationIac {
    /// Create a CloudFormation provider.
    pub fn new() -> Self {
        Self {
            table: StackTable::new("cloud_formation"),
        }
    }

    /// Capabilities the generated template requires: whatever the caller
    /// declares at generate time, plus `CAPABILITY_IAM` when any node needs
    /// an execution role for secret access.
    fn required_capabilities(plan: &DeployPlan, options: &IacConfig) -> Vec<String> {
        let mut required = options.capabilities.clone();
        if plan.graph_nodes.iter().any(|n| n.secret_provider.is_some())
            && !required.iter().any(|c| c == "CAPABILITY_IAM")
        {
            required.push("CAPABILITY_IAM".to_string());
        }
        required
    }

    fn template_for(plan: &DeployPlan) -> String {
        let resources: serde_json::Map<String, serde_json::Value> = plan
            .graph_nodes
            .iter()
            .map(|node| {
                (
                    node.concept.clone(),
                    json!({
                        "Type": format!("Kiln::Runtime::{}", node.runtime),
                        "Properties": {
                            "MemorySize": node.config.memory_mb,
                            "Timeout": node.config.timeout_secs,
                            "Region": node.config.region,
                        }
                    }),
                )
            })
            .collect();
        let template = json!({
            "AWSTemplateFormatVersion": "2010-09-09",
            "Description": format!("KILN plan {}", plan.id),
            "Resources": resources,
        });
        serde_json::to_string_pretty(&template).unwrap_or_default()
    }
}

impl Default for CloudFormationIac {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IacProvider for CloudFormationIac {
    fn name(&self) -> &'static str {
        "cloud_formation"
    }

    async fn generate(
        &self,
        plan: &DeployPlan,
        options: &IacConfig,
        emitter: &dyn Emitter,
    ) -> GeneratedStack {
        let stack = format!("{}-{}", plan.manifest, plan.environment);
        let path = format!("iac/cloudformation/{}/template.json", plan.id);
        emitter
            .write(
                &path,
                &Self::template_for(plan),
                "json",
                &[format!("plans/{}", plan.id)],
            )
            .await;

        self.table.record(
            &stack,
            plan,
            plan_resources(plan),
            Self::required_capabilities(plan, options),
            None,
        );
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::RecordingEmitter;
    use crate::iac::tests::plan_with_nodes;

    #[tokio::test]
    async fn test_apply_enforces_capabilities() {
        let cfn = CloudFormationIac::new();
        let emitter = RecordingEmitter::new();
        let plan = plan_with_nodes(&["User"]);
        let options = IacConfig {
            capabilities: vec!["CAPABILITY_IAM".to_string()],
            backend_config: None,
        };

        let generated = cfn.generate(&plan, &options, &emitter).await;

        // No grants: rejected with the full requirement list
        assert_eq!(
            cfn.apply(&generated.stack, &[]).await,
            ApplyOutcome::InsufficientCapabilities {
                required: vec!["CAPABILITY_IAM".to_string()]
            }
        );

        // Matching grants: applied
        assert!(matches!(
            cfn.apply(&generated.stack, &["CAPABILITY_IAM".to_string()])
                .await,
            ApplyOutcome::Ok { .. }
        ));
    }

    #[tokio::test]
    async fn test_secret_reader_pulls_in_iam_capability() {
        let cfn = CloudFormationIac::new();
        let emitter = RecordingEmitter::new();
        let mut plan = plan_with_nodes(&["User"]);
        plan.graph_nodes[0].secret_provider = Some("vault".to_string());

        let generated = cfn.generate(&plan, &IacConfig::default(), &emitter).await;
        assert!(matches!(
            cfn.apply(&generated.stack, &[]).await,
            ApplyOutcome::InsufficientCapabilities { required }
                if required == vec!["CAPABILITY_IAM".to_string()]
        ));
    }

    #[tokio::test]
    async fn test_template_lists_every_node() {
        let cfn = CloudFormationIac::new();
        let emitter = RecordingEmitter::new();
        let plan = plan_with_nodes(&["User", "Cart"]);
        cfn.generate(&plan, &IacConfig::default(), &emitter).await;

        let template = emitter
            .file("iac/cloudformation/dp-1/template.json")
            .unwrap();
        assert!(template.content.contains("\"User\""));
        assert!(template.content.contains("\"Cart\""));
    }
}
