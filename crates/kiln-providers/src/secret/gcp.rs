//! GCP Secret Manager secret backend
//!
//! Versions are addressed by resource name:
//! `projects/<project>/secrets/<name>/versions/<n>`.

use super::{FetchOutcome, RotateOutcome, SecretProvider, SecretTable};
use async_trait::async_trait;

/// GCP Secret Manager provider.
pub struct GcpSecretManager {
    table: SecretTable,
    project: String,
}

impl GcpSecretManager {
    /// Create a provider for the default `kiln-platform` project.
    pub fn new() -> Self {
        Self::with_project("kiln-platform")
    }

    /// Create a provider for a specific GCP project.
    pub fn with_project(project: impl Into<String>) -> Self {
        Self {
            table: SecretTable::new("gcp_sm"),
            project: project.into(),
        }
    }

    /// Fully qualified resource name of a secret version.
    pub fn version_name(&self, name: &str, version: u64) -> String {
        format!(
            "projects/{}/secrets/{}/versions/{}",
            self.project, name, version
        )
    }
}

impl Default for GcpSecretManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretProvider for GcpSecretManager {
    fn name(&self) -> &'static str {
        "gcp_sm"
    }

    async fn put(&self, name: &str, value: &str) -> u64 {
        self.table.put(name, value)
    }

    async fn fetch(&self, name: &str) -> FetchOutcome {
        match self.table.fetch(name) {
            Some(secret) => FetchOutcome::Ok {
                value: secret.value,
                version: secret.version,
                lease: None,
            },
            None => FetchOutcome::NotFound,
        }
    }

    async fn rotate(&self, name: &str) -> RotateOutcome {
        match self.table.rotate(name) {
            Some(new_version) => RotateOutcome::Ok { new_version },
            None => RotateOutcome::NotFound,
        }
    }

    async fn exists(&self, name: &str) -> bool {
        self.table.exists(name)
    }

    async fn invalidate_cache(&self, name: &str) {
        self.table.invalidate(name);
    }
}
