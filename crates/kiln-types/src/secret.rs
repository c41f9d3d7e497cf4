//! Secret and lease types
//!
//! Secret values live with their provider; the records here carry the
//! coordination state: versions that only move forward, and at most one
//! active lease per (path, provider).

use crate::ids::LeaseId;
use serde::{Deserialize, Serialize};

/// A stored secret version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRecord {
    /// Secret path or name
    pub name: String,

    /// Provider backend holding the value
    pub provider: String,

    /// Version, strictly increasing across rotations
    pub version: u64,

    /// Secret value
    pub value: String,

    /// Last updated timestamp
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// A lease on a fetched secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretLease {
    /// Unique lease identifier
    pub id: LeaseId,

    /// Secret path this lease covers
    pub path: String,

    /// Provider backend that issued the lease
    pub provider: String,

    /// Secret version the lease was issued against
    pub version: u64,

    /// Lease duration in seconds
    pub duration_secs: u64,

    /// Issued timestamp
    pub issued_at: chrono::DateTime<chrono::Utc>,

    /// Expiry timestamp
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl SecretLease {
    /// Whether the lease has expired as of `now`.
    pub fn expired_at(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_expiry() {
        let now = chrono::Utc::now();
        let lease = SecretLease {
            id: LeaseId::new("lease-1"),
            path: "prod/db".to_string(),
            provider: "vault".to_string(),
            version: 1,
            duration_secs: 3600,
            issued_at: now,
            expires_at: now + chrono::Duration::seconds(3600),
        };
        assert!(!lease.expired_at(now));
        assert!(lease.expired_at(now + chrono::Duration::seconds(3601)));
    }
}
