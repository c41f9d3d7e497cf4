//! Artifact and build types
//!
//! Artifacts are content-addressed build outputs: the record ID derives from
//! the hash of the inputs, so two builds with identical inputs share a single
//! record. Once written, an artifact is immutable.

use crate::ids::{ArtifactId, BuildId};
use serde::{Deserialize, Serialize};

/// A content-addressed artifact record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Identifier derived from the content hash (`art-<hex>`)
    pub id: ArtifactId,

    /// Content hash, rendered `sha256-<hex>`
    pub hash: String,

    /// Storage location (S3 URI, image reference, path)
    pub location: String,

    /// Concept this artifact was built from
    pub concept: String,

    /// Source language
    pub language: String,

    /// Target platform
    pub platform: String,

    /// Size in bytes, when known
    pub size_bytes: u64,

    /// Created timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Outcome status of a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// Build produced an artifact
    Completed,
    /// Build failed
    Failed,
}

/// A build record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    /// Unique build identifier
    pub id: BuildId,

    /// Concept that was built
    pub concept: String,

    /// Source reference
    pub source: String,

    /// Source language
    pub language: String,

    /// Target platform
    pub platform: String,

    /// Hash of the produced artifact, when the build completed
    pub artifact_hash: Option<String>,

    /// Build status
    pub status: BuildStatus,

    /// Whether tests were run for this build
    pub tests_run: bool,

    /// Whether tests passed; implies `tests_run`
    pub tests_passed: bool,

    /// Test suite type, e.g. `unit`, `integration`
    pub test_type: Option<String>,

    /// Created timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Build {
    /// Invariant: `tests_passed` implies `tests_run`.
    pub fn test_flags_consistent(&self) -> bool {
        !self.tests_passed || self.tests_run
    }
}
