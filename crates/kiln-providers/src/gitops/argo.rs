//! Argo CD GitOps backend
//!
//! Emits one Application manifest per concept; reconciliation reports the
//! Argo `Synced` status.

use super::{EmittedManifests, GitOpsProvider, ManifestTable, ReconcileOutcome};
use crate::emitter::Emitter;
use async_trait::async_trait;
use kiln_types::DeployPlan;

/// Argo CD GitOps provider.
pub struct ArgoGitOps {
    table: ManifestTable,
}

impl ArgoGitOps {
    /// Create an Argo provider.
    pub fn new() -> Self {
        Self {
            table: ManifestTable::new("argo", "Synced"),
        }
    }

    fn application_for(plan: &DeployPlan, concept: &str, repo: &str, path: &str) -> String {
        format!(
            "apiVersion: argoproj.io/v1alpha1\n\
             kind: Application\n\
             metadata:\n\
             \x20 name: {}-{}\n\
             spec:\n\
             \x20 project: {}\n\
             \x20 source:\n\
             \x20   repoURL: {}\n\
             \x20   path: {}\n\
             \x20 destination:\n\
             \x20   namespace: {}\n",
            plan.manifest,
            concept.to_lowercase(),
            plan.manifest,
            repo,
            path,
            plan.environment
        )
    }
}

impl Default for ArgoGitOps {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GitOpsProvider for ArgoGitOps {
    fn name(&self) -> &'static str {
        "argo"
    }

    async fn emit(
        &self,
        plan: &DeployPlan,
        repo: &str,
        path: &str,
        emitter: &dyn Emitter,
    ) -> EmittedManifests {
        let manifest = format!("argo/{}", plan.id);
        let sources = vec![format!("plans/{}", plan.id)];
        let mut files = Vec::with_capacity(plan.graph_nodes.len());

        for node in &plan.graph_nodes {
            let file = format!("{}/{}-application.yaml", path, node.concept.to_lowercase());
            emitter
                .write(
                    &file,
                    &Self::application_for(plan, &node.concept, repo, path),
                    "yaml",
                    &sources,
                )
                .await;
            files.push(file);
        }

        self.table.record(&manifest, repo, plan);
        EmittedManifests { manifest, files }
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
    async fn test_emit_one_application_per_concept() {
        let argo = ArgoGitOps::new();
        let emitter = RecordingEmitter::new();
        let plan = plan_with_nodes(&["User", "Cart"]);

        let emitted = argo
            .emit(&plan, "git@example:infra", "apps/shop", &emitter)
            .await;
        assert_eq!(emitted.manifest, "argo/dp-1");
        assert_eq!(emitted.files.len(), 2);

        let app = emitter.file("apps/shop/user-application.yaml").unwrap();
        assert!(app.content.contains("kind: Application"));
        assert!(app.content.contains("repoURL: git@example:infra"));

        // First poll pending, second synced
        assert!(matches!(
            argo.reconciliation_status(&emitted.manifest).await,
            ReconcileOutcome::Pending { .. }
        ));
        assert!(matches!(
            argo.reconciliation_status(&emitted.manifest).await,
            ReconcileOutcome::Ok { ref status, .. } if status == "Synced"
        ));
    }
}
