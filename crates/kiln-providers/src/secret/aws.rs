//! AWS Secrets Manager secret backend
//!
//! Rotation is two-phase the way Secrets Manager stages it: `rotate` parks
//! the new version under a pending stage, and the next fetch promotes it to
//! current. A second rotate while a pending stage exists reports
//! `InProgress`.

use super::{FetchOutcome, RotateOutcome, SecretProvider, SecretTable};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

/// AWS Secrets Manager provider.
pub struct AwsSecretsManager {
    table: SecretTable,
    pending: DashMap<String, u64>,
}

impl AwsSecretsManager {
    /// Create a Secrets Manager provider.
    pub fn new() -> Self {
        Self {
            table: SecretTable::new("aws_sm"),
            pending: DashMap::new(),
        }
    }

    /// Promote a pending rotation, if any, before serving a read.
    fn promote_pending(&self, name: &str) {
        if let Some((_, version)) = self.pending.remove(name) {
            debug!(name = name, version = version, "Pending stage promoted to current");
        }
    }
}

impl Default for AwsSecretsManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretProvider for AwsSecretsManager {
    fn name(&self) -> &'static str {
        "aws_sm"
    }

    async fn put(&self, name: &str, value: &str) -> u64 {
        self.pending.remove(name);
        self.table.put(name, value)
    }

    async fn fetch(&self, name: &str) -> FetchOutcome {
        self.promote_pending(name);
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
        if self.pending.contains_key(name) {
            return RotateOutcome::InProgress;
        }
        match self.table.rotate(name) {
            Some(new_version) => {
                self.pending.insert(name.to_string(), new_version);
                RotateOutcome::Ok { new_version }
            }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_rotate_before_fetch_is_in_progress() {
        let sm = AwsSecretsManager::new();
        sm.put("api-key", "abc123").await;

        assert_eq!(
            sm.rotate("api-key").await,
            RotateOutcome::Ok { new_version: 2 }
        );
        assert_eq!(sm.rotate("api-key").await, RotateOutcome::InProgress);

        // Fetch promotes the pending stage; rotation becomes possible again
        assert!(matches!(sm.fetch("api-key").await, FetchOutcome::Ok { .. }));
        assert_eq!(
            sm.rotate("api-key").await,
            RotateOutcome::Ok { new_version: 3 }
        );
    }

    #[tokio::test]
    async fn test_rotate_unknown_secret() {
        let sm = AwsSecretsManager::new();
        assert_eq!(sm.rotate("nope").await, RotateOutcome::NotFound);
    }
}
