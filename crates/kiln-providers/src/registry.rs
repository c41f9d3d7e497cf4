//! Explicit provider registry
//!
//! Dispatch is a table lookup: (family, backend name) to provider object,
//! populated at startup. An unknown backend name is a lookup miss the
//! caller turns into a validation failure, never a panic.

use crate::gitops::{ArgoGitOps, FluxGitOps, GitOpsProvider};
use crate::iac::{CloudFormationIac, DockerComposeIac, IacProvider, PulumiIac};
use crate::runtime::{
    CloudFunctionsRuntime, CloudRunRuntime, CloudflareRuntime, DockerComposeRuntime,
    KubernetesRuntime, LambdaRuntime, LocalRuntime, RuntimeProvider, VercelRuntime,
};
use crate::secret::{AwsSecretsManager, DotenvSecrets, GcpSecretManager, SecretProvider, VaultSecrets};
use crate::toolchain::ToolchainRegistry;
use dashmap::DashMap;
use kiln_types::IdSource;
use std::sync::Arc;
use tracing::info;

/// Registry of every provider family, keyed by backend name.
pub struct ProviderRegistry {
    runtimes: DashMap<String, Arc<dyn RuntimeProvider>>,
    iac: DashMap<String, Arc<dyn IacProvider>>,
    secrets: DashMap<String, Arc<dyn SecretProvider>>,
    gitops: DashMap<String, Arc<dyn GitOpsProvider>>,
    toolchains: ToolchainRegistry,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            runtimes: DashMap::new(),
            iac: DashMap::new(),
            secrets: DashMap::new(),
            gitops: DashMap::new(),
            toolchains: ToolchainRegistry::new(),
        }
    }

    /// Registry wired with every built-in backend.
    pub fn with_defaults(ids: Arc<dyn IdSource>) -> Self {
        let registry = Self::new();

        registry.register_runtime(Arc::new(LambdaRuntime::new(ids.clone())));
        registry.register_runtime(Arc::new(CloudRunRuntime::new(ids.clone())));
        registry.register_runtime(Arc::new(KubernetesRuntime::new(ids.clone())));
        registry.register_runtime(Arc::new(VercelRuntime::new(ids.clone())));
        registry.register_runtime(Arc::new(CloudFunctionsRuntime::new(ids.clone())));
        registry.register_runtime(Arc::new(CloudflareRuntime::new(ids.clone())));
        registry.register_runtime(Arc::new(LocalRuntime::new(ids.clone())));
        registry.register_runtime(Arc::new(DockerComposeRuntime::new(ids.clone())));

        registry.register_iac(Arc::new(PulumiIac::new()));
        registry.register_iac(Arc::new(CloudFormationIac::new()));
        registry.register_iac(Arc::new(DockerComposeIac::new()));

        registry.register_secret(Arc::new(VaultSecrets::new(ids)));
        registry.register_secret(Arc::new(AwsSecretsManager::new()));
        registry.register_secret(Arc::new(GcpSecretManager::new()));
        registry.register_secret(Arc::new(DotenvSecrets::new()));

        registry.register_gitops(Arc::new(ArgoGitOps::new()));
        registry.register_gitops(Arc::new(FluxGitOps::new()));

        info!("Provider registry populated with built-in backends");
        registry
    }

    /// Register a runtime backend under its type name.
    pub fn register_runtime(&self, provider: Arc<dyn RuntimeProvider>) {
        self.runtimes
            .insert(provider.type_name().to_string(), provider);
    }

    /// Register an IaC backend under its name.
    pub fn register_iac(&self, provider: Arc<dyn IacProvider>) {
        self.iac.insert(provider.name().to_string(), provider);
    }

    /// Register a secret backend under its name.
    pub fn register_secret(&self, provider: Arc<dyn SecretProvider>) {
        self.secrets.insert(provider.name().to_string(), provider);
    }

    /// Register a GitOps backend under its name.
    pub fn register_gitops(&self, provider: Arc<dyn GitOpsProvider>) {
        self.gitops.insert(provider.name().to_string(), provider);
    }

    /// Runtime backend by name.
    pub fn runtime(&self, name: &str) -> Option<Arc<dyn RuntimeProvider>> {
        self.runtimes.get(name).map(|p| p.clone())
    }

    /// IaC backend by name.
    pub fn iac(&self, name: &str) -> Option<Arc<dyn IacProvider>> {
        self.iac.get(name).map(|p| p.clone())
    }

    /// Secret backend by name.
    pub fn secret(&self, name: &str) -> Option<Arc<dyn SecretProvider>> {
        self.secrets.get(name).map(|p| p.clone())
    }

    /// GitOps backend by name.
    pub fn gitops(&self, name: &str) -> Option<Arc<dyn GitOpsProvider>> {
        self.gitops.get(name).map(|p| p.clone())
    }

    /// Toolchain sub-registry.
    pub fn toolchains(&self) -> &ToolchainRegistry {
        &self.toolchains
    }

    /// Registered runtime backend names, sorted.
    pub fn runtime_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.runtimes.iter().map(|p| p.key().clone()).collect();
        names.sort();
        names
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
