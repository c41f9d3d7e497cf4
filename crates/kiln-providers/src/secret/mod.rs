//! Secret provider family
//!
//! One contract over secret backends: fetch with optional leasing, rotation
//! with monotonically increasing versions, existence checks, and cache
//! invalidation. Each backend owns its own secret relation and keeps at
//! most one active lease per secret path.

pub mod aws;
pub mod dotenv;
pub mod gcp;
pub mod vault;

pub use aws::AwsSecretsManager;
pub use dotenv::DotenvSecrets;
pub use gcp::GcpSecretManager;
pub use vault::VaultSecrets;

use async_trait::async_trait;
use dashmap::DashMap;
use kiln_store::Relation;
use kiln_types::SecretLease;
use tracing::debug;

/// Outcome of `fetch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Secret value at its current version
    Ok {
        value: String,
        version: u64,
        lease: Option<SecretLease>,
    },
    /// No secret at this path
    NotFound,
}

/// Outcome of `rotate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotateOutcome {
    /// New version minted
    Ok { new_version: u64 },
    /// A rotation is already pending
    InProgress,
    /// No secret at this path
    NotFound,
}

/// Outcome of `renew_lease` (Vault only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewOutcome {
    /// Lease extended
    Ok { expires_at: chrono::DateTime<chrono::Utc> },
    /// Lease is gone; the caller must fetch again
    LeaseExpired,
}

/// Uniform contract over secret backends.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Backend name used in manifests and the provider registry.
    fn name(&self) -> &'static str;

    /// Write a secret value, returning the stored version.
    async fn put(&self, name: &str, value: &str) -> u64;

    /// Read the current value.
    async fn fetch(&self, name: &str) -> FetchOutcome;

    /// Mint a new version. Versions strictly increase across rotations.
    async fn rotate(&self, name: &str) -> RotateOutcome;

    /// Whether a secret exists at this path.
    async fn exists(&self, name: &str) -> bool;

    /// Drop any cached value for this path.
    async fn invalidate_cache(&self, name: &str);
}

/// A versioned secret owned by one backend.
#[derive(Debug, Clone)]
pub(crate) struct StoredSecret {
    pub(crate) value: String,
    pub(crate) version: u64,
}

/// Shared versioned-secret state for backends: backing store plus a
/// read-through cache.
pub(crate) struct SecretTable {
    secrets: Relation<StoredSecret>,
    cache: DashMap<String, StoredSecret>,
}

impl SecretTable {
    pub(crate) fn new(relation_name: &'static str) -> Self {
        Self {
            secrets: Relation::new(relation_name),
            cache: DashMap::new(),
        }
    }

    pub(crate) fn put(&self, name: &str, value: &str) -> u64 {
        self.cache.remove(name);
        if self.secrets.contains(name) {
            self.secrets
                .update(name, |secret| {
                    secret.version += 1;
                    secret.value = value.to_string();
                    secret.version
                })
                .unwrap_or(1)
        } else {
            self.secrets.put(
                name,
                StoredSecret {
                    value: value.to_string(),
                    version: 1,
                },
            );
            1
        }
    }

    /// Read through the cache; a hit can serve a stale version until
    /// `invalidate` drops it.
    pub(crate) fn fetch(&self, name: &str) -> Option<StoredSecret> {
        if let Some(cached) = self.cache.get(name) {
            debug!(name = name, "Secret served from cache");
            return Some(cached.clone());
        }
        let secret = self.secrets.get(name)?;
        self.cache.insert(name.to_string(), secret.clone());
        Some(secret)
    }

    /// Bump the version with a backend-generated value. The backend's own
    /// cache entry is dropped so the next fetch observes the new version.
    pub(crate) fn rotate(&self, name: &str) -> Option<u64> {
        let new_version = self
            .secrets
            .update(name, |secret| {
                secret.version += 1;
                secret.value = format!("{}@v{}", name, secret.version);
                secret.version
            })
            .ok()?;
        self.cache.remove(name);
        Some(new_version)
    }

    pub(crate) fn exists(&self, name: &str) -> bool {
        self.secrets.contains(name)
    }

    pub(crate) fn invalidate(&self, name: &str) {
        self.cache.remove(name);
    }
}
