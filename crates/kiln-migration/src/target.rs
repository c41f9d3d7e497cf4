//! Migration data-plane trait and test target

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Result of a data copy pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyReport {
    /// Records copied to the new shape
    pub migrated: u64,
    /// Records that could not be copied
    pub failed: u64,
    /// One error per failed batch
    pub errors: Vec<String>,
}

/// The data plane a migration runs against.
#[async_trait]
pub trait MigrationTarget: Send + Sync {
    /// Estimate the records a migration of this concept will touch.
    async fn estimate_records(&self, concept: &str, from_version: u64, to_version: u64) -> u64;

    /// Apply additive schema changes for the given steps.
    async fn apply_expand(&self, concept: &str, steps: &[String]) -> Result<(), String>;

    /// Copy records into the new shape.
    async fn copy_records(&self, concept: &str, steps: &[String]) -> CopyReport;

    /// Verify copied data before legacy removal.
    async fn verify(&self, concept: &str) -> bool;

    /// Drop legacy fields once verification passed.
    async fn drop_legacy(&self, concept: &str, steps: &[String]) -> Result<(), String>;
}

/// In-memory migration target for tests and local development.
pub struct InMemoryMigrationTarget {
    record_counts: DashMap<String, u64>,
    fail_copy_after: DashMap<String, u64>,
    verification_passes: AtomicBool,
}

impl InMemoryMigrationTarget {
    /// Create a target where every concept holds `records` records.
    pub fn new() -> Self {
        Self {
            record_counts: DashMap::new(),
            fail_copy_after: DashMap::new(),
            verification_passes: AtomicBool::new(true),
        }
    }

    /// Seed the record count for a concept.
    pub fn seed(&self, concept: &str, records: u64) {
        self.record_counts.insert(concept.to_string(), records);
    }

    /// Make copies of this concept fail after the first `succeed` records.
    pub fn fail_copy_after(&self, concept: &str, succeed: u64) {
        self.fail_copy_after.insert(concept.to_string(), succeed);
    }

    /// Make post-copy verification fail.
    pub fn fail_verification(&self) {
        self.verification_passes.store(false, Ordering::SeqCst);
    }
}

impl Default for InMemoryMigrationTarget {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MigrationTarget for InMemoryMigrationTarget {
    async fn estimate_records(&self, concept: &str, from_version: u64, to_version: u64) -> u64 {
        let base = self.record_counts.get(concept).map(|c| *c).unwrap_or(0);
        // Every version hop touches the full record set once
        base * (to_version - from_version)
    }

    async fn apply_expand(&self, _concept: &str, _steps: &[String]) -> Result<(), String> {
        Ok(())
    }

    async fn copy_records(&self, concept: &str, steps: &[String]) -> CopyReport {
        let total = self.record_counts.get(concept).map(|c| *c).unwrap_or(0) * steps.len() as u64;
        match self.fail_copy_after.get(concept) {
            Some(succeed) if *succeed < total => CopyReport {
                migrated: *succeed,
                failed: total - *succeed,
                errors: vec![format!(
                    "copy failed after {} of {} records",
                    *succeed, total
                )],
            },
            _ => CopyReport {
                migrated: total,
                failed: 0,
                errors: Vec::new(),
            },
        }
    }

    async fn verify(&self, _concept: &str) -> bool {
        self.verification_passes.load(Ordering::SeqCst)
    }

    async fn drop_legacy(&self, _concept: &str, _steps: &[String]) -> Result<(), String> {
        Ok(())
    }
}
