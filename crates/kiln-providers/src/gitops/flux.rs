//! Flux GitOps backend
//!
//! Emits a Kustomization per plan; reconciliation reports the Flux `Ready`
//! condition.

use super::{EmittedManifests, GitOpsProvider, ManifestTable, ReconcileOutcome};
use crate::emitter::Emitter;
use async_trait::async_trait;
use kiln_types::DeployPlan;

/// Flux GitOps provider.
pub struct FluxGitOps {
    table: ManifestTable,
}

impl FluxGitOps {
    /// Create a Flux provider.
    pub fn new() -> Self {
        Self {
            table: ManifestTable::new("flux", "Ready"),
        }
    }

    fn kustomization_for(plan: &DeployPlan, repo: &str, path: &str) -> String {
        let mut resources = String::new();
        for node in &plan.graph_nodes {
            resources.push_str(&format!("    - {}.yaml\n", node.concept.to_lowercase()));
        }
        format!(
            "apiVersion: kustomize.toolkit.fluxcd.io/v1\n\
             kind: Kustomization\n\
             metadata:\n\
             \x20 name: {}\n\
             spec:\n\
             \x20 interval: 5m\n\
             \x20 sourceRef:\n\
             \x20   kind: GitRepository\n\
             \x20   name: {}\n\
             \x20 path: {}\n\
             \x20 resources:\n{}",
            plan.manifest, repo, path, resources
        )
    }
}

impl Default for FluxGitOps {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GitOpsProvider for FluxGitOps {
    fn name(&self) -> &'static str {
        "flux"
    }

    async fn emit(
        &self,
        plan: &DeployPlan,
        repo: &str,
        path: &str,
        emitter: &dyn Emitter,
    ) -> EmittedManifests {
        let manifest = format!("flux/{}", plan.id);
        let file = format!("{}/kustomization.yaml", path);
        emitter
            .write(
                &file,
                &Self::kustomization_for(plan, repo, path),
                "yaml",
                &[format!("plans/{}", plan.id)],
            )
            .await;

        self.table.record(&manifest, repo, plan);
        EmittedManifests {
            manifest,
            files: vec![file],
        }
    }

    async fn reconciliation_status(&self, manifest: &str) -> ReconcileOutcome {
        self.table.status(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::RecordingEmitter;
    use crate::iac::tests::plan_with_nodes;

    #[tokio::test]
    async fn test_emit_kustomization_and_converge() {
        let flux = FluxGitOps::new();
        let emitter = RecordingEmitter::new();
        let plan = plan_with_nodes(&["Orders"]);

        let emitted = flux
            .emit(&plan, "infra-repo", "clusters/staging", &emitter)
            .await;
        assert_eq!(emitted.files, vec!["clusters/staging/kustomization.yaml"]);

        let file = emitter.file("clusters/staging/kustomization.yaml").unwrap();
        assert!(file.content.contains("kind: Kustomization"));
        assert!(file.content.contains("- orders.yaml"));

        assert!(matches!(
            flux.reconciliation_status(&emitted.manifest).await,
            ReconcileOutcome::Pending { .. }
        ));
        assert!(matches!(
            flux.reconciliation_status(&emitted.manifest).await,
            ReconcileOutcome::Ok { ref status, .. } if status == "Ready"
        ));
        assert!(matches!(
            flux.reconciliation_status("flux/unknown").await,
            ReconcileOutcome::Failed { .. }
        ));
    }
}
