//! Migration types
//!
//! Expand/migrate/contract schema evolution between concept versions.
//! Phases only advance forward; each phase is idempotent.

use crate::ids::MigrationId;
use serde::{Deserialize, Serialize};

/// Phase of a schema migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    /// Steps enumerated, nothing applied
    Planned,
    /// Additive schema changes applied
    Expanded,
    /// Data copied to the new shape
    Migrated,
    /// Legacy fields removed
    Contracted,
}

impl MigrationPhase {
    /// Progress value this phase represents.
    pub fn progress(self) -> f64 {
        match self {
            Self::Planned => 0.0,
            Self::Expanded => 1.0 / 3.0,
            Self::Migrated => 2.0 / 3.0,
            Self::Contracted => 1.0,
        }
    }
}

/// A migration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Migration {
    /// Unique migration identifier
    pub id: MigrationId,

    /// Concept whose schema is evolving
    pub concept: String,

    /// Source version
    pub from_version: u64,

    /// Target version, strictly greater than `from_version`
    pub to_version: u64,

    /// Step names, `vN-to-vN+1` for N in `[from, to)`
    pub steps: Vec<String>,

    /// Current phase
    pub phase: MigrationPhase,

    /// Progress in `[0.0, 1.0]`, never decreasing
    pub progress: f64,

    /// Estimated records to migrate
    pub estimated_records: u64,

    /// Records migrated so far
    pub records_migrated: u64,

    /// Created timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// Last updated timestamp
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Migration {
    /// Enumerate step names for a version range.
    pub fn step_names(from: u64, to: u64) -> Vec<String> {
        (from..to).map(|v| format!("v{}-to-v{}", v, v + 1)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_names() {
        assert_eq!(
            Migration::step_names(1, 3),
            vec!["v1-to-v2".to_string(), "v2-to-v3".to_string()]
        );
        assert!(Migration::step_names(2, 2).is_empty());
    }

    #[test]
    fn test_phase_progress_is_monotone() {
        let phases = [
            MigrationPhase::Planned,
            MigrationPhase::Expanded,
            MigrationPhase::Migrated,
            MigrationPhase::Contracted,
        ];
        for pair in phases.windows(2) {
            assert!(pair[0].progress() < pair[1].progress());
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(MigrationPhase::Contracted.progress(), 1.0);
    }
}
