//! Rollout controller state machine

use kiln_providers::{HealthOutcome, RuntimeProvider};
use kiln_store::Relation;
use kiln_types::{
    rollout::validate_steps, EventSource, IdSource, InstanceId, KilnEvent, KilnEventEnvelope,
    PlanId, Rollout, RolloutId, RolloutStatus, Strategy,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

/// Outcome of `begin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginOutcome {
    /// Rollout created and active
    Ok { rollout: RolloutId },
    /// Strategy name not recognized
    InvalidStrategy { strategy: String },
    /// Custom steps not monotonic or not ending at 100
    InvalidSteps,
}

/// Outcome of `advance`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Advanced one step
    Ok { step: u32, weight: u32 },
    /// Every step served; traffic fully shifted
    Complete,
    /// Rollout is paused; nothing changed
    Paused { reason: String },
    /// Rollout was aborted; nothing changed
    Aborted,
    /// Unknown rollout
    NotFound,
}

/// Outcome of `pause`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseOutcome {
    /// Paused (or already paused; pausing twice is a no-op)
    Ok,
    /// Rollout already finished; cannot pause
    NotActive,
    /// Unknown rollout
    NotFound,
}

/// Outcome of `resume`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// Active again (or already active; resuming twice is a no-op)
    Ok,
    /// Rollout already finished; cannot resume
    NotActive,
    /// Unknown rollout
    NotFound,
}

/// Outcome of `abort`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortOutcome {
    /// Aborted; traffic weight reset to zero
    Ok,
    /// Rollout already completed; nothing to abort
    AlreadyComplete,
    /// Unknown rollout
    NotFound,
}

/// Point-in-time view of a rollout.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutStatusView {
    /// 1-based position of the next unserved step
    pub step: u32,
    /// Current traffic weight
    pub weight: u32,
    /// Current status
    pub status: RolloutStatus,
    /// Seconds since the rollout started
    pub elapsed_secs: i64,
}

/// Rollout controller. Owns the `rollout` relation; every transition is
/// serialized under the record's entry lock, so racing advances cannot
/// double-increment.
pub struct RolloutController {
    rollouts: Relation<Rollout>,
    ids: Arc<dyn IdSource>,
    event_tx: broadcast::Sender<KilnEventEnvelope>,
}

impl RolloutController {
    /// Create a controller minting IDs from the given source.
    pub fn new(ids: Arc<dyn IdSource>) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            rollouts: Relation::new("rollout"),
            ids,
            event_tx,
        }
    }

    /// Subscribe to rollout events.
    pub fn subscribe(&self) -> broadcast::Receiver<KilnEventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Start a rollout for a deployed plan.
    ///
    /// `steps` overrides the strategy's default weight sequence; custom
    /// steps must be monotonically non-decreasing and end at 100.
    #[instrument(skip(self), fields(plan = %plan))]
    pub async fn begin(
        &self,
        plan: &PlanId,
        strategy: &str,
        steps: Option<Vec<u32>>,
    ) -> BeginOutcome {
        let strategy: Strategy = match strategy.parse() {
            Ok(strategy) => strategy,
            Err(_) => {
                warn!(strategy = strategy, "Unknown rollout strategy");
                return BeginOutcome::InvalidStrategy {
                    strategy: strategy.to_string(),
                };
            }
        };

        let weight_steps = match steps {
            Some(custom) => {
                if !validate_steps(&custom) {
                    return BeginOutcome::InvalidSteps;
                }
                custom
            }
            None => strategy.default_steps(),
        };

        let id = RolloutId::new(self.ids.next_id("ro"));
        let now = chrono::Utc::now();
        self.rollouts.put(
            id.as_str(),
            Rollout {
                id: id.clone(),
                plan: plan.clone(),
                strategy,
                weight_steps,
                current_step: 1,
                current_weight: 0,
                status: RolloutStatus::Active,
                started_at: now,
                updated_at: now,
            },
        );

        info!(rollout = %id, strategy = %strategy, "Rollout started");
        self.emit(KilnEvent::RolloutStarted {
            rollout: id.clone(),
            plan: plan.clone(),
            strategy: strategy.to_string(),
        });
        BeginOutcome::Ok { rollout: id }
    }

    /// Advance one weight step.
    ///
    /// While active, the served weight is non-decreasing; the transition to
    /// `Complete` happens on the advance after the last step. A paused
    /// rollout reports `Paused` and stays untouched.
    #[instrument(skip(self), fields(rollout = %rollout))]
    pub async fn advance(&self, rollout: &RolloutId) -> AdvanceOutcome {
        let result = self.rollouts.update(rollout.as_str(), |record| {
            match &record.status {
                RolloutStatus::Paused { reason, .. } => {
                    (AdvanceOutcome::Paused { reason: reason.clone() }, false)
                }
                RolloutStatus::Aborted => (AdvanceOutcome::Aborted, false),
                RolloutStatus::Complete => (AdvanceOutcome::Complete, false),
                RolloutStatus::Active => {
                    let index = record.current_step as usize - 1;
                    match record.weight_steps.get(index) {
                        Some(&weight) => {
                            record.current_weight = weight;
                            record.current_step += 1;
                            record.updated_at = chrono::Utc::now();
                            (
                                AdvanceOutcome::Ok {
                                    step: index as u32 + 1,
                                    weight,
                                },
                                false,
                            )
                        }
                        None => {
                            record.status = RolloutStatus::Complete;
                            record.updated_at = chrono::Utc::now();
                            (AdvanceOutcome::Complete, true)
                        }
                    }
                }
            }
        });

        match result {
            Ok((outcome, completed_now)) => {
                match &outcome {
                    AdvanceOutcome::Ok { step, weight } => {
                        info!(rollout = %rollout, step = step, weight = weight, "Rollout advanced");
                        self.emit(KilnEvent::RolloutAdvanced {
                            rollout: rollout.clone(),
                            step: *step,
                            weight: *weight,
                        });
                    }
                    AdvanceOutcome::Complete if completed_now => {
                        info!(rollout = %rollout, "Rollout complete");
                        self.emit(KilnEvent::RolloutCompleted {
                            rollout: rollout.clone(),
                        });
                    }
                    _ => {}
                }
                outcome
            }
            Err(_) => AdvanceOutcome::NotFound,
        }
    }

    /// Advance behind a health gate: an unreachable instance pauses the
    /// rollout instead of aborting it, and a served step propagates the new
    /// weight to the instance through the provider.
    pub async fn advance_checked(
        &self,
        rollout: &RolloutId,
        provider: &dyn RuntimeProvider,
        instance: &InstanceId,
    ) -> AdvanceOutcome {
        match provider.health_check(instance).await {
            HealthOutcome::Ok { .. } => {}
            HealthOutcome::Unreachable => {
                warn!(rollout = %rollout, instance = %instance, "Instance unhealthy; pausing");
                self.pause(rollout, "unhealthy").await;
                return AdvanceOutcome::Paused {
                    reason: "unhealthy".to_string(),
                };
            }
        }

        let outcome = self.advance(rollout).await;
        if let AdvanceOutcome::Ok { weight, .. } = &outcome {
            provider.set_traffic_weight(instance, *weight).await;
        }
        outcome
    }

    /// Hold the rollout at its current weight. Pausing a paused rollout is
    /// a no-op.
    #[instrument(skip(self), fields(rollout = %rollout))]
    pub async fn pause(&self, rollout: &RolloutId, reason: &str) -> PauseOutcome {
        let result = self.rollouts.update(rollout.as_str(), |record| match &record.status {
            RolloutStatus::Active => {
                record.status = RolloutStatus::Paused {
                    reason: reason.to_string(),
                    paused_at: chrono::Utc::now(),
                };
                record.updated_at = chrono::Utc::now();
                (PauseOutcome::Ok, true)
            }
            RolloutStatus::Paused { .. } => (PauseOutcome::Ok, false),
            RolloutStatus::Complete | RolloutStatus::Aborted => (PauseOutcome::NotActive, false),
        });

        match result {
            Ok((outcome, transitioned)) => {
                if transitioned {
                    info!(rollout = %rollout, reason = reason, "Rollout paused");
                    self.emit(KilnEvent::RolloutPaused {
                        rollout: rollout.clone(),
                        reason: reason.to_string(),
                    });
                }
                outcome
            }
            Err(_) => PauseOutcome::NotFound,
        }
    }

    /// Resume a paused rollout. Resuming an active rollout is a no-op.
    #[instrument(skip(self), fields(rollout = %rollout))]
    pub async fn resume(&self, rollout: &RolloutId) -> ResumeOutcome {
        let result = self.rollouts.update(rollout.as_str(), |record| match &record.status {
            RolloutStatus::Paused { .. } => {
                record.status = RolloutStatus::Active;
                record.updated_at = chrono::Utc::now();
                (ResumeOutcome::Ok, true)
            }
            RolloutStatus::Active => (ResumeOutcome::Ok, false),
            RolloutStatus::Complete | RolloutStatus::Aborted => (ResumeOutcome::NotActive, false),
        });

        match result {
            Ok((outcome, transitioned)) => {
                if transitioned {
                    info!(rollout = %rollout, "Rollout resumed");
                    self.emit(KilnEvent::RolloutResumed {
                        rollout: rollout.clone(),
                    });
                }
                outcome
            }
            Err(_) => ResumeOutcome::NotFound,
        }
    }

    /// Abort the rollout and reset the traffic weight to zero. The only
    /// transition that reduces the weight.
    #[instrument(skip(self), fields(rollout = %rollout))]
    pub async fn abort(&self, rollout: &RolloutId) -> AbortOutcome {
        let result = self.rollouts.update(rollout.as_str(), |record| match &record.status {
            RolloutStatus::Complete => (AbortOutcome::AlreadyComplete, false),
            RolloutStatus::Aborted => (AbortOutcome::Ok, false),
            RolloutStatus::Active | RolloutStatus::Paused { .. } => {
                record.status = RolloutStatus::Aborted;
                record.current_weight = 0;
                record.updated_at = chrono::Utc::now();
                (AbortOutcome::Ok, true)
            }
        });

        match result {
            Ok((outcome, transitioned)) => {
                if transitioned {
                    warn!(rollout = %rollout, "Rollout aborted");
                    self.emit(KilnEvent::RolloutAborted {
                        rollout: rollout.clone(),
                    });
                }
                outcome
            }
            Err(_) => AbortOutcome::NotFound,
        }
    }

    /// Point-in-time status.
    pub async fn status(&self, rollout: &RolloutId) -> Option<RolloutStatusView> {
        self.rollouts.get(rollout.as_str()).map(|record| {
            RolloutStatusView {
                step: record.current_step.min(record.weight_steps.len() as u32),
                weight: record.current_weight,
                status: record.status.clone(),
                elapsed_secs: record.elapsed_secs(),
            }
        })
    }

    /// Read the full rollout record.
    pub async fn get(&self, rollout: &RolloutId) -> Option<Rollout> {
        self.rollouts.get(rollout.as_str())
    }

    fn emit(&self, event: KilnEvent) {
        let _ = self
            .event_tx
            .send(KilnEventEnvelope::new(event, EventSource::Rollout));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_types::MonotonicIdSource;

    fn controller() -> RolloutController {
        RolloutController::new(Arc::new(MonotonicIdSource::new()))
    }

    async fn begin(controller: &RolloutController, strategy: &str) -> RolloutId {
        match controller
            .begin(&PlanId::new("dp-1"), strategy, None)
            .await
        {
            BeginOutcome::Ok { rollout } => rollout,
            other => panic!("unexpected begin: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_canary_advances_through_default_steps() {
        let controller = controller();
        let rollout = begin(&controller, "canary").await;

        for expected in [10, 25, 50, 100] {
            match controller.advance(&rollout).await {
                AdvanceOutcome::Ok { weight, .. } => assert_eq!(weight, expected),
                other => panic!("unexpected advance: {:?}", other),
            }
        }
        assert_eq!(controller.advance(&rollout).await, AdvanceOutcome::Complete);

        let record = controller.get(&rollout).await.unwrap();
        assert_eq!(record.status, RolloutStatus::Complete);
        assert_eq!(record.current_weight, 100);
    }

    #[tokio::test]
    async fn test_weight_is_non_decreasing_until_complete() {
        let controller = controller();
        let rollout = begin(&controller, "linear").await;

        let mut last = 0;
        loop {
            match controller.advance(&rollout).await {
                AdvanceOutcome::Ok { weight, .. } => {
                    assert!(weight >= last);
                    last = weight;
                }
                AdvanceOutcome::Complete => break,
                other => panic!("unexpected advance: {:?}", other),
            }
        }
        assert_eq!(last, 100);
    }

    #[tokio::test]
    async fn test_abort_resets_weight_mid_rollout() {
        let controller = controller();
        let rollout = begin(&controller, "canary").await;

        controller.advance(&rollout).await;
        controller.advance(&rollout).await;
        assert_eq!(controller.status(&rollout).await.unwrap().weight, 25);

        assert_eq!(controller.abort(&rollout).await, AbortOutcome::Ok);
        let status = controller.status(&rollout).await.unwrap();
        assert_eq!(status.weight, 0);
        assert_eq!(status.status, RolloutStatus::Aborted);

        assert_eq!(controller.advance(&rollout).await, AdvanceOutcome::Aborted);
    }

    #[tokio::test]
    async fn test_abort_after_complete_reports_already_complete() {
        let controller = controller();
        let rollout = begin(&controller, "immediate").await;

        controller.advance(&rollout).await;
        assert_eq!(controller.advance(&rollout).await, AdvanceOutcome::Complete);
        assert_eq!(
            controller.abort(&rollout).await,
            AbortOutcome::AlreadyComplete
        );
    }

    #[tokio::test]
    async fn test_paused_advance_reports_reason_and_holds_state() {
        let controller = controller();
        let rollout = begin(&controller, "canary").await;
        controller.advance(&rollout).await;

        assert_eq!(
            controller.pause(&rollout, "error budget burned").await,
            PauseOutcome::Ok
        );
        // Pausing twice is a no-op
        assert_eq!(
            controller.pause(&rollout, "again").await,
            PauseOutcome::Ok
        );

        match controller.advance(&rollout).await {
            AdvanceOutcome::Paused { reason } => assert_eq!(reason, "error budget burned"),
            other => panic!("unexpected advance: {:?}", other),
        }
        assert_eq!(controller.status(&rollout).await.unwrap().weight, 10);

        assert_eq!(controller.resume(&rollout).await, ResumeOutcome::Ok);
        assert!(matches!(
            controller.advance(&rollout).await,
            AdvanceOutcome::Ok { weight: 25, .. }
        ));
    }

    #[tokio::test]
    async fn test_unknown_strategy_and_bad_steps() {
        let controller = controller();
        assert_eq!(
            controller.begin(&PlanId::new("dp-1"), "big-bang", None).await,
            BeginOutcome::InvalidStrategy {
                strategy: "big-bang".to_string()
            }
        );
        assert_eq!(
            controller
                .begin(&PlanId::new("dp-1"), "canary", Some(vec![50, 10]))
                .await,
            BeginOutcome::InvalidSteps
        );
    }

    #[tokio::test]
    async fn test_blue_green_collapses_to_cutover() {
        let controller = controller();
        let rollout = begin(&controller, "blue-green").await;

        assert!(matches!(
            controller.advance(&rollout).await,
            AdvanceOutcome::Ok { weight: 0, .. }
        ));
        assert!(matches!(
            controller.advance(&rollout).await,
            AdvanceOutcome::Ok { weight: 100, .. }
        ));
        assert_eq!(controller.advance(&rollout).await, AdvanceOutcome::Complete);
    }

    #[tokio::test]
    async fn test_racing_advances_never_double_increment() {
        let controller = Arc::new(controller());
        let rollout = begin(&controller, "linear").await;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let controller = controller.clone();
            let rollout = rollout.clone();
            handles.push(tokio::spawn(async move {
                controller.advance(&rollout).await
            }));
        }

        let mut served = 0;
        for handle in handles {
            if let AdvanceOutcome::Ok { .. } = handle.await.unwrap() {
                served += 1;
            }
        }
        // Exactly one winner per weight step
        assert_eq!(served, 5);
        assert_eq!(controller.status(&rollout).await.unwrap().weight, 100);
    }

    #[tokio::test]
    async fn test_unhealthy_instance_pauses_not_aborts() {
        use kiln_providers::runtime::LambdaRuntime;
        use kiln_types::RuntimeConfig;

        let controller = controller();
        let rollout = begin(&controller, "canary").await;

        let lambda = LambdaRuntime::new(Arc::new(MonotonicIdSource::new()));
        let provisioned = lambda.provision("User", &RuntimeConfig::default()).await;
        let instance = provisioned.instance().clone();

        // Nothing deployed yet: health check is unreachable
        let outcome = controller
            .advance_checked(&rollout, &lambda, &instance)
            .await;
        assert_eq!(
            outcome,
            AdvanceOutcome::Paused {
                reason: "unhealthy".to_string()
            }
        );

        // Deploy, resume, and the gate opens; the weight lands on the instance
        lambda.deploy(&instance, "s3://bucket/user.zip").await;
        controller.resume(&rollout).await;
        assert!(matches!(
            controller
                .advance_checked(&rollout, &lambda, &instance)
                .await,
            AdvanceOutcome::Ok { weight: 10, .. }
        ));
        assert_eq!(
            lambda.get_instance(&instance).await.unwrap().traffic_weight,
            10
        );
    }
}
