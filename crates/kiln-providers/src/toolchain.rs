//! Toolchain provider family
//!
//! Per-language toolchains are external collaborators reached through a
//! resolve/register contract: `register` announces the language and
//! capabilities, `resolve` discovers a concrete compiler for a platform
//! under a semver constraint. The registry is keyed by language.

use async_trait::async_trait;
use dashmap::DashMap;
use semver::{Version, VersionReq};
use std::sync::Arc;
use tracing::info;

/// Metadata a toolchain announces at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Toolchain name, e.g. `rustc`
    pub name: String,
    /// Language this toolchain builds
    pub language: String,
    /// Capability tags, e.g. `cross-compile`, `incremental`
    pub capabilities: Vec<String>,
}

/// Outcome of `resolve`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// A concrete toolchain satisfying the constraint
    Ok {
        toolchain: String,
        compiler_path: String,
        version: Version,
        capabilities: Vec<String>,
    },
    /// No installed version satisfies the constraint
    NotInstalled,
    /// The platform target is not available
    TargetMissing { platform: String },
    /// Building for this platform requires Xcode
    XcodeRequired,
    /// The requested EVM hard fork is not supported
    EvmVersionUnsupported { requested: String },
}

/// Per-language toolchain contract.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Announce name, language, and capabilities.
    fn register(&self) -> Registration;

    /// Discover a concrete compiler for `platform` under a semver
    /// `version_constraint`.
    async fn resolve(&self, platform: &str, version_constraint: &str) -> ResolveOutcome;
}

/// Registry of toolchains keyed by language.
pub struct ToolchainRegistry {
    by_language: DashMap<String, Arc<dyn Toolchain>>,
}

impl ToolchainRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            by_language: DashMap::new(),
        }
    }

    /// Register a toolchain under its announced language.
    pub fn register(&self, toolchain: Arc<dyn Toolchain>) -> Registration {
        let registration = toolchain.register();
        info!(
            name = %registration.name,
            language = %registration.language,
            "Toolchain registered"
        );
        self.by_language
            .insert(registration.language.clone(), toolchain);
        registration
    }

    /// Toolchain for a language, if registered.
    pub fn for_language(&self, language: &str) -> Option<Arc<dyn Toolchain>> {
        self.by_language.get(language).map(|t| t.clone())
    }

    /// Registered languages, sorted.
    pub fn languages(&self) -> Vec<String> {
        let mut languages: Vec<_> = self.by_language.iter().map(|t| t.key().clone()).collect();
        languages.sort();
        languages
    }
}

impl Default for ToolchainRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Configurable in-memory toolchain for tests and local development.
pub struct StubToolchain {
    name: String,
    language: String,
    version: Version,
    compiler_path: String,
    capabilities: Vec<String>,
    targets: Vec<String>,
    installed: bool,
    needs_xcode: bool,
    xcode_available: bool,
    evm_versions: Vec<String>,
}

impl StubToolchain {
    /// A stub that resolves for the given targets.
    pub fn new(
        name: impl Into<String>,
        language: impl Into<String>,
        version: Version,
        targets: &[&str],
    ) -> Self {
        let name = name.into();
        Self {
            compiler_path: format!("/usr/local/bin/{}", name),
            name,
            language: language.into(),
            version,
            capabilities: vec!["build".to_string(), "test".to_string()],
            targets: targets.iter().map(|t| (*t).to_string()).collect(),
            installed: true,
            needs_xcode: false,
            xcode_available: false,
            evm_versions: Vec::new(),
        }
    }

    /// Mark the toolchain as absent from the machine.
    pub fn not_installed(mut self) -> Self {
        self.installed = false;
        self
    }

    /// Require Xcode for Darwin targets, with the given availability.
    pub fn requiring_xcode(mut self, available: bool) -> Self {
        self.needs_xcode = true;
        self.xcode_available = available;
        self
    }

    /// Constrain the supported EVM hard forks (`evm-<fork>` platforms).
    pub fn with_evm_versions(mut self, forks: &[&str]) -> Self {
        self.evm_versions = forks.iter().map(|f| (*f).to_string()).collect();
        self
    }
}

#[async_trait]
impl Toolchain for StubToolchain {
    fn register(&self) -> Registration {
        Registration {
            name: self.name.clone(),
            language: self.language.clone(),
            capabilities: self.capabilities.clone(),
        }
    }

    async fn resolve(&self, platform: &str, version_constraint: &str) -> ResolveOutcome {
        if !self.installed {
            return ResolveOutcome::NotInstalled;
        }

        if let Some(fork) = platform.strip_prefix("evm-") {
            if !self.evm_versions.iter().any(|f| f == fork) {
                return ResolveOutcome::EvmVersionUnsupported {
                    requested: fork.to_string(),
                };
            }
        } else if !self.targets.iter().any(|t| t == platform) {
            if self.needs_xcode && platform.starts_with("darwin") {
                if !self.xcode_available {
                    return ResolveOutcome::XcodeRequired;
                }
            } else {
                return ResolveOutcome::TargetMissing {
                    platform: platform.to_string(),
                };
            }
        }

        match VersionReq::parse(version_constraint) {
            Ok(req) if req.matches(&self.version) => ResolveOutcome::Ok {
                toolchain: self.name.clone(),
                compiler_path: self.compiler_path.clone(),
                version: self.version.clone(),
                capabilities: self.capabilities.clone(),
            },
            _ => ResolveOutcome::NotInstalled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_resolves_by_language() {
        let registry = ToolchainRegistry::new();
        let registration = registry.register(Arc::new(StubToolchain::new(
            "rustc",
            "rust",
            Version::new(1, 84, 0),
            &["linux-x64", "darwin-arm64"],
        )));
        assert_eq!(registration.language, "rust");

        let toolchain = registry.for_language("rust").unwrap();
        match toolchain.resolve("linux-x64", "^1.80").await {
            ResolveOutcome::Ok { version, .. } => assert_eq!(version, Version::new(1, 84, 0)),
            other => panic!("unexpected resolve: {:?}", other),
        }
        assert!(registry.for_language("cobol").is_none());
    }

    #[tokio::test]
    async fn test_fatal_resolve_variants() {
        let missing = StubToolchain::new("go", "go", Version::new(1, 23, 0), &["linux-x64"])
            .not_installed();
        assert_eq!(missing.resolve("linux-x64", "*").await, ResolveOutcome::NotInstalled);

        let narrow = StubToolchain::new("zig", "zig", Version::new(0, 13, 0), &["linux-x64"]);
        assert_eq!(
            narrow.resolve("windows-x64", "*").await,
            ResolveOutcome::TargetMissing {
                platform: "windows-x64".to_string()
            }
        );

        let swift = StubToolchain::new("swiftc", "swift", Version::new(6, 0, 0), &["linux-x64"])
            .requiring_xcode(false);
        assert_eq!(
            swift.resolve("darwin-arm64", "*").await,
            ResolveOutcome::XcodeRequired
        );

        let solc = StubToolchain::new("solc", "solidity", Version::new(0, 8, 26), &[])
            .with_evm_versions(&["shanghai", "cancun"]);
        assert_eq!(
            solc.resolve("evm-prague", "*").await,
            ResolveOutcome::EvmVersionUnsupported {
                requested: "prague".to_string()
            }
        );
        assert!(matches!(
            solc.resolve("evm-cancun", "^0.8").await,
            ResolveOutcome::Ok { .. }
        ));
    }

    #[tokio::test]
    async fn test_version_constraint_mismatch() {
        let rust = StubToolchain::new("rustc", "rust", Version::new(1, 70, 0), &["linux-x64"]);
        assert_eq!(
            rust.resolve("linux-x64", "^1.80").await,
            ResolveOutcome::NotInstalled
        );
    }
}
