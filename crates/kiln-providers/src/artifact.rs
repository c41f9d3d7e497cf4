//! Content-addressed artifact cache
//!
//! Artifact records are keyed by the hash of their inputs, so two builds
//! with identical inputs share a single record. `store` is idempotent by
//! hash: a second call with the same hash reports `AlreadyExists` instead
//! of overwriting. Build records track test results alongside.

use kiln_store::Relation;
use kiln_types::{Artifact, ArtifactId, Build, BuildId, BuildStatus, GcConfig, IdSource};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A build's artifact handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    /// Content-addressed artifact ID, `art-<hex>`
    pub artifact: ArtifactId,
    /// Content hash, `sha256-<hex>`
    pub hash: String,
    /// Build record created for this invocation
    pub build: BuildId,
}

/// Outcome of `store`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Fresh record written
    Stored { artifact: ArtifactId },
    /// A record with this hash already exists; nothing was overwritten
    AlreadyExists { artifact: ArtifactId },
}

/// Outcome of `gc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcOutcome {
    /// Artifact records removed
    pub removed: Vec<ArtifactId>,
    /// Bytes reclaimed
    pub freed_bytes: u64,
}

/// Test results attached to a build. Holding a report implies the tests
/// ran, so `tests_passed` can never be set without `tests_run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestReport {
    /// Suite type, e.g. `unit`, `integration`
    pub test_type: String,
    /// Whether the suite passed
    pub passed: bool,
}

/// Content-addressed artifact cache and build ledger.
pub struct ArtifactCache {
    artifacts: Relation<Artifact>,
    builds: Relation<Build>,
    ids: Arc<dyn IdSource>,
}

impl ArtifactCache {
    /// Create an empty cache minting build IDs from the given source.
    pub fn new(ids: Arc<dyn IdSource>) -> Self {
        Self {
            artifacts: Relation::new("artifact"),
            builds: Relation::new("build"),
            ids,
        }
    }

    /// Stable hash over build inputs, rendered as bare hex.
    fn content_hash(concept: &str, spec: &str, implementation: &str, deps: &[String]) -> String {
        let mut hasher = Sha256::new();
        for field in [concept, spec, implementation] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.update((deps.len() as u64).to_le_bytes());
        for dep in deps {
            hasher.update((dep.len() as u64).to_le_bytes());
            hasher.update(dep.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Build an artifact from concept inputs. Idempotent: identical inputs
    /// hash identically and share one artifact record.
    pub fn build(
        &self,
        concept: &str,
        spec: &str,
        implementation: &str,
        deps: &[String],
        language: &str,
        platform: &str,
    ) -> BuildOutcome {
        let digest = Self::content_hash(concept, spec, implementation, deps);
        let hash = format!("sha256-{}", digest);
        let artifact_id = ArtifactId::new(format!("art-{}", digest));

        if !self.artifacts.contains(&hash) {
            let size_bytes =
                (spec.len() + implementation.len() + deps.iter().map(String::len).sum::<usize>())
                    as u64;
            self.artifacts.put(
                &hash,
                Artifact {
                    id: artifact_id.clone(),
                    hash: hash.clone(),
                    location: format!("cas://{}", digest),
                    concept: concept.to_string(),
                    language: language.to_string(),
                    platform: platform.to_string(),
                    size_bytes,
                    created_at: chrono::Utc::now(),
                },
            );
            info!(concept = concept, hash = %hash, "Artifact built");
        } else {
            debug!(concept = concept, hash = %hash, "Artifact cache hit");
        }

        let build_id = BuildId::new(self.ids.next_id("build"));
        self.builds.put(
            build_id.as_str(),
            Build {
                id: build_id.clone(),
                concept: concept.to_string(),
                source: spec.to_string(),
                language: language.to_string(),
                platform: platform.to_string(),
                artifact_hash: Some(hash.clone()),
                status: BuildStatus::Completed,
                tests_run: false,
                tests_passed: false,
                test_type: None,
                created_at: chrono::Utc::now(),
            },
        );

        BuildOutcome {
            artifact: artifact_id,
            hash,
            build: build_id,
        }
    }

    /// Store an externally built artifact. Idempotent keyed on hash.
    pub fn store(
        &self,
        hash: &str,
        location: &str,
        concept: &str,
        language: &str,
        platform: &str,
        size_bytes: u64,
    ) -> StoreOutcome {
        let digest = hash.strip_prefix("sha256-").unwrap_or(hash);
        let hash = format!("sha256-{}", digest);
        let artifact_id = ArtifactId::new(format!("art-{}", digest));

        let inserted = self.artifacts.insert_new(
            &hash,
            Artifact {
                id: artifact_id.clone(),
                hash: hash.clone(),
                location: location.to_string(),
                concept: concept.to_string(),
                language: language.to_string(),
                platform: platform.to_string(),
                size_bytes,
                created_at: chrono::Utc::now(),
            },
        );

        match inserted {
            Ok(()) => StoreOutcome::Stored {
                artifact: artifact_id,
            },
            Err(_) => {
                let existing = self
                    .artifacts
                    .get(&hash)
                    .map(|a| a.id)
                    .unwrap_or(artifact_id);
                StoreOutcome::AlreadyExists { artifact: existing }
            }
        }
    }

    /// Artifact record by content hash.
    pub fn by_hash(&self, hash: &str) -> Option<Artifact> {
        self.artifacts.get(hash)
    }

    /// Attach a test report to a build.
    pub fn record_tests(&self, build: &BuildId, report: TestReport) -> Option<Build> {
        self.builds
            .update(build.as_str(), |record| {
                record.tests_run = true;
                record.tests_passed = report.passed;
                record.test_type = Some(report.test_type.clone());
                record.clone()
            })
            .ok()
    }

    /// Build record by ID.
    pub fn build_status(&self, build: &BuildId) -> Option<Build> {
        self.builds.get(build.as_str())
    }

    /// Builds for a concept, newest first.
    pub fn build_history(&self, concept: &str) -> Vec<Build> {
        let mut history = self.builds.find(|b| b.concept == concept);
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        history
    }

    /// Remove artifacts older than the cutoff, always keeping the newest
    /// `keep_versions` records per concept.
    pub fn gc(&self, config: &GcConfig) -> GcOutcome {
        let cutoff = chrono::Utc::now() - chrono::Duration::seconds(config.older_than_secs as i64);

        let mut by_concept: HashMap<String, Vec<Artifact>> = HashMap::new();
        for artifact in self.artifacts.list() {
            by_concept
                .entry(artifact.concept.clone())
                .or_default()
                .push(artifact);
        }

        let mut removed = Vec::new();
        let mut freed_bytes = 0u64;
        for artifacts in by_concept.values_mut() {
            artifacts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            for artifact in artifacts.iter().skip(config.keep_versions) {
                if artifact.created_at < cutoff {
                    if self.artifacts.remove(&artifact.hash).is_some() {
                        freed_bytes += artifact.size_bytes;
                        removed.push(artifact.id.clone());
                    }
                }
            }
        }

        if !removed.is_empty() {
            info!(
                removed = removed.len(),
                freed_bytes = freed_bytes,
                "Artifact GC pass complete"
            );
        }
        GcOutcome {
            removed,
            freed_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_types::MonotonicIdSource;

    fn cache() -> ArtifactCache {
        ArtifactCache::new(Arc::new(MonotonicIdSource::new()))
    }

    #[test]
    fn test_identical_inputs_share_one_artifact() {
        let cache = cache();
        let deps = vec!["d1".to_string()];

        let first = cache.build("Password", "s", "i", &deps, "rust", "linux-x64");
        let second = cache.build("Password", "s", "i", &deps, "rust", "linux-x64");

        assert_eq!(first.hash, second.hash);
        assert_eq!(first.artifact, second.artifact);
        assert!(first.hash.starts_with("sha256-"));
        assert!(first.artifact.as_str().starts_with("art-"));
        // Artifact ID carries the same digest as the hash
        assert_eq!(
            first.artifact.as_str().trim_start_matches("art-"),
            first.hash.trim_start_matches("sha256-")
        );

        // Different inputs hash differently
        let third = cache.build("Password", "s", "i2", &deps, "rust", "linux-x64");
        assert_ne!(first.hash, third.hash);
    }

    #[test]
    fn test_store_is_idempotent_by_hash() {
        let cache = cache();
        let first = cache.store("sha256-X", "/a", "User", "rust", "linux-x64", 10);
        let second = cache.store("sha256-X", "/b", "User", "rust", "linux-x64", 10);

        let artifact = match first {
            StoreOutcome::Stored { artifact } => artifact,
            other => panic!("unexpected store: {:?}", other),
        };
        assert_eq!(second, StoreOutcome::AlreadyExists { artifact });

        // The original location survives
        assert_eq!(cache.by_hash("sha256-X").unwrap().location, "/a");
    }

    #[test]
    fn test_build_ledger_and_test_reports() {
        let cache = cache();
        let outcome = cache.build("User", "s", "i", &[], "rust", "linux-x64");

        let build = cache.build_status(&outcome.build).unwrap();
        assert_eq!(build.status, BuildStatus::Completed);
        assert!(!build.tests_run);
        assert!(build.test_flags_consistent());

        let updated = cache
            .record_tests(
                &outcome.build,
                TestReport {
                    test_type: "unit".to_string(),
                    passed: true,
                },
            )
            .unwrap();
        assert!(updated.tests_run);
        assert!(updated.tests_passed);
        assert!(updated.test_flags_consistent());

        let history = cache.build_history("User");
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_gc_keeps_newest_versions() {
        let cache = cache();
        cache.store("sha256-old", "/old", "User", "rust", "linux-x64", 100);
        cache.store("sha256-new", "/new", "User", "rust", "linux-x64", 50);

        // Nothing is old enough under the default window
        let outcome = cache.gc(&GcConfig::default());
        assert!(outcome.removed.is_empty());
        assert_eq!(outcome.freed_bytes, 0);

        // Zero window and zero keep count: everything but nothing newer
        // than the cutoff can go; records were just created, so a zero
        // window still spares them only via keep_versions
        let aggressive = GcConfig {
            older_than_secs: 0,
            keep_versions: 1,
        };
        let outcome = cache.gc(&aggressive);
        assert_eq!(outcome.removed.len(), 1);
        assert!(outcome.freed_bytes > 0);
    }
}
