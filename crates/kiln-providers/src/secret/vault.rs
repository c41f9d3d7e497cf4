//! HashiCorp Vault secret backend
//!
//! Fetches issue leases with a 3600-second default duration; at most one
//! active lease exists per path. `renew_lease` extends an existing lease
//! and reports `LeaseExpired` once the lease record is gone.

use super::{FetchOutcome, RenewOutcome, RotateOutcome, SecretProvider, SecretTable};
use async_trait::async_trait;
use dashmap::DashMap;
use kiln_store::Relation;
use kiln_types::{IdSource, LeaseId, SecretLease};
use std::sync::Arc;
use tracing::info;

/// Default lease duration in seconds.
pub const LEASE_DURATION_SECS: u64 = 3600;

/// Vault secret provider.
pub struct VaultSecrets {
    table: SecretTable,
    leases: Relation<SecretLease>,
    active_by_path: DashMap<String, LeaseId>,
    ids: Arc<dyn IdSource>,
}

impl VaultSecrets {
    /// Create a Vault provider minting lease IDs from the given source.
    pub fn new(ids: Arc<dyn IdSource>) -> Self {
        Self {
            table: SecretTable::new("vault"),
            leases: Relation::new("vault_leases"),
            active_by_path: DashMap::new(),
            ids,
        }
    }

    /// Existing unexpired lease for a path, or a fresh one.
    fn lease_for(&self, path: &str, version: u64) -> SecretLease {
        let now = chrono::Utc::now();
        if let Some(existing) = self
            .active_by_path
            .get(path)
            .and_then(|id| self.leases.get(id.as_str()))
        {
            if !existing.expired_at(now) && existing.version == version {
                return existing;
            }
        }

        let id = LeaseId::new(self.ids.next_id("lease"));
        let lease = SecretLease {
            id: id.clone(),
            path: path.to_string(),
            provider: "vault".to_string(),
            version,
            duration_secs: LEASE_DURATION_SECS,
            issued_at: now,
            expires_at: now + chrono::Duration::seconds(LEASE_DURATION_SECS as i64),
        };
        self.leases.put(id.as_str(), lease.clone());
        self.active_by_path.insert(path.to_string(), id.clone());
        info!(path = path, lease = %id, "Vault lease issued");
        lease
    }

    /// Extend a lease by its full duration.
    pub async fn renew_lease(&self, lease: &LeaseId) -> RenewOutcome {
        match self.leases.update(lease.as_str(), |record| {
            record.expires_at =
                chrono::Utc::now() + chrono::Duration::seconds(record.duration_secs as i64);
            record.expires_at
        }) {
            Ok(expires_at) => RenewOutcome::Ok { expires_at },
            Err(_) => RenewOutcome::LeaseExpired,
        }
    }

    /// Drop a lease record, ending its validity.
    pub async fn revoke_lease(&self, lease: &LeaseId) {
        if let Some(record) = self.leases.remove(lease.as_str()) {
            self.active_by_path.remove(&record.path);
        }
    }
}

#[async_trait]
impl SecretProvider for VaultSecrets {
    fn name(&self) -> &'static str {
        "vault"
    }

    async fn put(&self, name: &str, value: &str) -> u64 {
        self.table.put(name, value)
    }

    async fn fetch(&self, name: &str) -> FetchOutcome {
        match self.table.fetch(name) {
            Some(secret) => {
                let lease = self.lease_for(name, secret.version);
                FetchOutcome::Ok {
                    value: secret.value,
                    version: secret.version,
                    lease: Some(lease),
                }
            }
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
