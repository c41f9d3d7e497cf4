//! Migration engine phase machine

use crate::target::MigrationTarget;
use kiln_store::Relation;
use kiln_types::{
    EventSource, IdSource, KilnEvent, KilnEventEnvelope, Migration, MigrationId, MigrationPhase,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

/// Outcome of `plan`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanMigrationOutcome {
    /// Migration planned
    Ok {
        migration: MigrationId,
        steps: Vec<String>,
        estimated_records: u64,
    },
    /// Source and target versions are equal
    NoMigrationNeeded,
    /// Target version is older than the source
    Incompatible { reason: String },
}

/// Outcome of `expand`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpandOutcome {
    /// Schema expanded (or already was; expanding twice is a no-op)
    Ok,
    /// Additive change failed
    Failed { reason: String },
    /// Unknown migration
    NotFound,
}

/// Outcome of `migrate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrateOutcome {
    /// All records copied
    Ok { records_migrated: u64 },
    /// Some records failed to copy; phase does not advance
    Partial {
        migrated: u64,
        failed: u64,
        errors: Vec<String>,
    },
    /// `expand` has not run yet
    NotExpanded,
    /// Unknown migration
    NotFound,
}

/// Outcome of `contract`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractOutcome {
    /// Legacy fields removed; migration closed
    Ok,
    /// Data verification failed; phase stays at migrated
    Rollback { migration: MigrationId },
    /// `migrate` has not completed yet
    NotMigrated,
    /// Legacy removal failed
    Failed { reason: String },
    /// Unknown migration
    NotFound,
}

/// Point-in-time view of a migration.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationStatusView {
    /// Current phase
    pub phase: MigrationPhase,
    /// Progress in `[0.0, 1.0]`
    pub progress: f64,
    /// Records migrated so far
    pub records_migrated: u64,
    /// Estimated records to migrate
    pub estimated_records: u64,
}

/// Migration engine. Owns the `migration` relation; phases advance only
/// forward and `progress` never decreases.
pub struct MigrationEngine {
    migrations: Relation<Migration>,
    target: Arc<dyn MigrationTarget>,
    ids: Arc<dyn IdSource>,
    event_tx: broadcast::Sender<KilnEventEnvelope>,
}

impl MigrationEngine {
    /// Create an engine over the given data plane.
    pub fn new(target: Arc<dyn MigrationTarget>, ids: Arc<dyn IdSource>) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            migrations: Relation::new("migration"),
            target,
            ids,
            event_tx,
        }
    }

    /// Subscribe to migration events.
    pub fn subscribe(&self) -> broadcast::Receiver<KilnEventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Plan a migration between concept versions. Steps are enumerated as
    /// `vN-to-vN+1` for every hop in the range.
    #[instrument(skip(self))]
    pub async fn plan(
        &self,
        concept: &str,
        from_version: u64,
        to_version: u64,
    ) -> PlanMigrationOutcome {
        if from_version == to_version {
            return PlanMigrationOutcome::NoMigrationNeeded;
        }
        if to_version < from_version {
            return PlanMigrationOutcome::Incompatible {
                reason: format!(
                    "cannot migrate {} backwards from v{} to v{}",
                    concept, from_version, to_version
                ),
            };
        }

        let steps = Migration::step_names(from_version, to_version);
        let estimated_records = self
            .target
            .estimate_records(concept, from_version, to_version)
            .await;

        let id = MigrationId::new(self.ids.next_id("mig"));
        let now = chrono::Utc::now();
        self.migrations.put(
            id.as_str(),
            Migration {
                id: id.clone(),
                concept: concept.to_string(),
                from_version,
                to_version,
                steps: steps.clone(),
                phase: MigrationPhase::Planned,
                progress: MigrationPhase::Planned.progress(),
                estimated_records,
                records_migrated: 0,
                created_at: now,
                updated_at: now,
            },
        );

        info!(
            migration = %id,
            concept = concept,
            steps = steps.len(),
            estimated_records = estimated_records,
            "Migration planned"
        );
        PlanMigrationOutcome::Ok {
            migration: id,
            steps,
            estimated_records,
        }
    }

    /// Apply additive schema changes. Idempotent past the expanded phase.
    #[instrument(skip(self), fields(migration = %migration))]
    pub async fn expand(&self, migration: &MigrationId) -> ExpandOutcome {
        let Some(record) = self.migrations.get(migration.as_str()) else {
            return ExpandOutcome::NotFound;
        };
        if record.phase >= MigrationPhase::Expanded {
            return ExpandOutcome::Ok;
        }

        if let Err(reason) = self
            .target
            .apply_expand(&record.concept, &record.steps)
            .await
        {
            warn!(migration = %migration, reason = %reason, "Expand failed");
            return ExpandOutcome::Failed { reason };
        }

        self.advance_phase(migration, MigrationPhase::Expanded);
        ExpandOutcome::Ok
    }

    /// Copy records into the new shape. Idempotent past the migrated
    /// phase; a partial copy leaves the phase untouched so the copy can be
    /// re-driven.
    #[instrument(skip(self), fields(migration = %migration))]
    pub async fn migrate(&self, migration: &MigrationId) -> MigrateOutcome {
        let Some(record) = self.migrations.get(migration.as_str()) else {
            return MigrateOutcome::NotFound;
        };
        match record.phase {
            MigrationPhase::Planned => return MigrateOutcome::NotExpanded,
            MigrationPhase::Migrated | MigrationPhase::Contracted => {
                return MigrateOutcome::Ok {
                    records_migrated: record.records_migrated,
                };
            }
            MigrationPhase::Expanded => {}
        }

        let report = self
            .target
            .copy_records(&record.concept, &record.steps)
            .await;

        if report.failed > 0 {
            warn!(
                migration = %migration,
                migrated = report.migrated,
                failed = report.failed,
                "Partial data copy"
            );
            let _ = self.migrations.update(migration.as_str(), |m| {
                m.records_migrated = m.records_migrated.max(report.migrated);
                m.updated_at = chrono::Utc::now();
            });
            return MigrateOutcome::Partial {
                migrated: report.migrated,
                failed: report.failed,
                errors: report.errors,
            };
        }

        let _ = self.migrations.update(migration.as_str(), |m| {
            m.records_migrated = report.migrated;
        });
        self.advance_phase(migration, MigrationPhase::Migrated);
        MigrateOutcome::Ok {
            records_migrated: report.migrated,
        }
    }

    /// Remove legacy fields. Gated on data verification; a failed check
    /// reports `Rollback` and leaves the phase at migrated.
    #[instrument(skip(self), fields(migration = %migration))]
    pub async fn contract(&self, migration: &MigrationId) -> ContractOutcome {
        let Some(record) = self.migrations.get(migration.as_str()) else {
            return ContractOutcome::NotFound;
        };
        match record.phase {
            MigrationPhase::Planned | MigrationPhase::Expanded => {
                return ContractOutcome::NotMigrated;
            }
            MigrationPhase::Contracted => return ContractOutcome::Ok,
            MigrationPhase::Migrated => {}
        }

        if !self.target.verify(&record.concept).await {
            warn!(migration = %migration, "Data verification failed; holding contract");
            return ContractOutcome::Rollback {
                migration: migration.clone(),
            };
        }

        if let Err(reason) = self
            .target
            .drop_legacy(&record.concept, &record.steps)
            .await
        {
            return ContractOutcome::Failed { reason };
        }

        self.advance_phase(migration, MigrationPhase::Contracted);
        ContractOutcome::Ok
    }

    /// Point-in-time status.
    pub async fn status(&self, migration: &MigrationId) -> Option<MigrationStatusView> {
        self.migrations
            .get(migration.as_str())
            .map(|record| MigrationStatusView {
                phase: record.phase,
                progress: record.progress,
                records_migrated: record.records_migrated,
                estimated_records: record.estimated_records,
            })
    }

    /// Read the full migration record.
    pub async fn get(&self, migration: &MigrationId) -> Option<Migration> {
        self.migrations.get(migration.as_str())
    }

    fn advance_phase(&self, migration: &MigrationId, phase: MigrationPhase) {
        let updated = self.migrations.update(migration.as_str(), |record| {
            // Forward-only; progress never decreases
            if phase > record.phase {
                record.phase = phase;
                record.progress = record.progress.max(phase.progress());
                record.updated_at = chrono::Utc::now();
            }
            record.progress
        });
        if let Ok(progress) = updated {
            info!(migration = %migration, phase = ?phase, progress = progress, "Migration phase advanced");
            let _ = self.event_tx.send(KilnEventEnvelope::new(
                KilnEvent::MigrationPhaseChanged {
                    migration: migration.clone(),
                    phase,
                    progress,
                },
                EventSource::Migration,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::InMemoryMigrationTarget;
    use kiln_types::MonotonicIdSource;

    fn engine_with(target: InMemoryMigrationTarget) -> MigrationEngine {
        MigrationEngine::new(Arc::new(target), Arc::new(MonotonicIdSource::new()))
    }

    async fn planned(engine: &MigrationEngine, concept: &str, from: u64, to: u64) -> MigrationId {
        match engine.plan(concept, from, to).await {
            PlanMigrationOutcome::Ok { migration, .. } => migration,
            other => panic!("unexpected plan: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_plan_enumerates_version_hops() {
        let target = InMemoryMigrationTarget::new();
        target.seed("Entity", 100);
        let engine = engine_with(target);

        match engine.plan("Entity", 1, 3).await {
            PlanMigrationOutcome::Ok { steps, estimated_records, .. } => {
                assert_eq!(steps, vec!["v1-to-v2".to_string(), "v2-to-v3".to_string()]);
                assert_eq!(estimated_records, 200);
            }
            other => panic!("unexpected plan: {:?}", other),
        }

        assert_eq!(
            engine.plan("Entity", 2, 2).await,
            PlanMigrationOutcome::NoMigrationNeeded
        );
        assert!(matches!(
            engine.plan("Entity", 3, 2).await,
            PlanMigrationOutcome::Incompatible { .. }
        ));
    }

    #[tokio::test]
    async fn test_full_lifecycle_progress_is_monotone() {
        let target = InMemoryMigrationTarget::new();
        target.seed("Entity", 50);
        let engine = engine_with(target);
        let migration = planned(&engine, "Entity", 1, 2).await;

        let mut last_progress = engine.status(&migration).await.unwrap().progress;
        assert_eq!(last_progress, 0.0);

        assert_eq!(engine.expand(&migration).await, ExpandOutcome::Ok);
        let progress = engine.status(&migration).await.unwrap().progress;
        assert!(progress > last_progress);
        last_progress = progress;

        assert_eq!(
            engine.migrate(&migration).await,
            MigrateOutcome::Ok { records_migrated: 50 }
        );
        let status = engine.status(&migration).await.unwrap();
        assert!(status.progress > last_progress);
        assert_eq!(status.records_migrated, status.estimated_records);
        last_progress = status.progress;

        assert_eq!(engine.contract(&migration).await, ContractOutcome::Ok);
        let status = engine.status(&migration).await.unwrap();
        assert!(status.progress > last_progress);
        assert_eq!(status.progress, 1.0);
        assert_eq!(status.phase, MigrationPhase::Contracted);
    }

    #[tokio::test]
    async fn test_phases_are_idempotent() {
        let target = InMemoryMigrationTarget::new();
        target.seed("Entity", 10);
        let engine = engine_with(target);
        let migration = planned(&engine, "Entity", 1, 2).await;

        engine.expand(&migration).await;
        assert_eq!(engine.expand(&migration).await, ExpandOutcome::Ok);

        engine.migrate(&migration).await;
        assert_eq!(
            engine.migrate(&migration).await,
            MigrateOutcome::Ok { records_migrated: 10 }
        );

        engine.contract(&migration).await;
        assert_eq!(engine.contract(&migration).await, ContractOutcome::Ok);
        assert_eq!(engine.status(&migration).await.unwrap().progress, 1.0);
    }

    #[tokio::test]
    async fn test_out_of_order_phases_are_rejected() {
        let target = InMemoryMigrationTarget::new();
        target.seed("Entity", 10);
        let engine = engine_with(target);
        let migration = planned(&engine, "Entity", 1, 2).await;

        assert_eq!(engine.migrate(&migration).await, MigrateOutcome::NotExpanded);
        assert_eq!(engine.contract(&migration).await, ContractOutcome::NotMigrated);
    }

    #[tokio::test]
    async fn test_partial_copy_holds_phase_for_retry() {
        let target = InMemoryMigrationTarget::new();
        target.seed("Entity", 100);
        target.fail_copy_after("Entity", 60);
        let engine = engine_with(target);
        let migration = planned(&engine, "Entity", 1, 2).await;

        engine.expand(&migration).await;
        match engine.migrate(&migration).await {
            MigrateOutcome::Partial { migrated, failed, errors } => {
                assert_eq!(migrated, 60);
                assert_eq!(failed, 40);
                assert_eq!(errors.len(), 1);
            }
            other => panic!("unexpected migrate: {:?}", other),
        }

        let status = engine.status(&migration).await.unwrap();
        assert_eq!(status.phase, MigrationPhase::Expanded);
        assert_eq!(status.records_migrated, 60);
    }

    #[tokio::test]
    async fn test_failed_verification_blocks_contract() {
        let target = InMemoryMigrationTarget::new();
        target.seed("Entity", 10);
        target.fail_verification();
        let engine = engine_with(target);
        let migration = planned(&engine, "Entity", 1, 2).await;

        engine.expand(&migration).await;
        engine.migrate(&migration).await;
        assert_eq!(
            engine.contract(&migration).await,
            ContractOutcome::Rollback {
                migration: migration.clone()
            }
        );
        assert_eq!(
            engine.status(&migration).await.unwrap().phase,
            MigrationPhase::Migrated
        );
    }

    #[tokio::test]
    async fn test_unknown_migration() {
        let engine = engine_with(InMemoryMigrationTarget::new());
        let ghost = MigrationId::new("mig-999");
        assert_eq!(engine.expand(&ghost).await, ExpandOutcome::NotFound);
        assert_eq!(engine.migrate(&ghost).await, MigrateOutcome::NotFound);
        assert_eq!(engine.contract(&ghost).await, ContractOutcome::NotFound);
        assert!(engine.status(&ghost).await.is_none());
    }
}
