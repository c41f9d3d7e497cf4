//! Event types for KILN observability
//!
//! Events provide a unified stream of plan, rollout, and migration
//! lifecycle activities.

use crate::ids::{MigrationId, NodeId, PlanId, RolloutId};
use crate::migration::MigrationPhase;
use crate::plan::PlanPhase;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all KILN events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KilnEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Event source
    pub source: EventSource,

    /// The actual event
    pub event: KilnEvent,
}

impl KilnEventEnvelope {
    /// Wrap an event with a fresh envelope.
    pub fn new(event: KilnEvent, source: EventSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            source,
            event,
        }
    }
}

/// Event sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    /// Deploy planner and executor
    Planner,
    /// Rollout controller
    Rollout,
    /// Migration engine
    Migration,
    /// Provider adapters
    Provider,
}

/// KILN events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum KilnEvent {
    /// Plan created from a manifest
    PlanCreated {
        plan: PlanId,
        kit: String,
        environment: String,
        node_count: usize,
    },

    /// Plan passed validation
    PlanValidated {
        plan: PlanId,
        warnings: Vec<String>,
    },

    /// Plan phase changed
    PlanPhaseChanged {
        plan: PlanId,
        phase: PlanPhase,
    },

    /// A graph node deployed
    NodeDeployed {
        plan: PlanId,
        node: NodeId,
    },

    /// A graph node failed to deploy
    NodeFailed {
        plan: PlanId,
        node: NodeId,
        reason: String,
    },

    /// Plan executed to completion
    PlanExecuted {
        plan: PlanId,
        duration_secs: u64,
        nodes_deployed: usize,
    },

    /// Plan rolled back after a failure
    PlanRolledBack {
        plan: PlanId,
        rolled_back: Vec<NodeId>,
        stuck: Vec<NodeId>,
    },

    /// Rollout started
    RolloutStarted {
        rollout: RolloutId,
        plan: PlanId,
        strategy: String,
    },

    /// Rollout advanced one weight step
    RolloutAdvanced {
        rollout: RolloutId,
        step: u32,
        weight: u32,
    },

    /// Rollout paused
    RolloutPaused {
        rollout: RolloutId,
        reason: String,
    },

    /// Rollout resumed
    RolloutResumed {
        rollout: RolloutId,
    },

    /// Rollout reached full traffic
    RolloutCompleted {
        rollout: RolloutId,
    },

    /// Rollout aborted; traffic reset
    RolloutAborted {
        rollout: RolloutId,
    },

    /// Migration phase changed
    MigrationPhaseChanged {
        migration: MigrationId,
        phase: MigrationPhase,
        progress: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wraps_event() {
        let envelope = KilnEventEnvelope::new(
            KilnEvent::RolloutCompleted {
                rollout: RolloutId::new("ro-1"),
            },
            EventSource::Rollout,
        );
        assert_eq!(envelope.source, EventSource::Rollout);
        assert!(matches!(envelope.event, KilnEvent::RolloutCompleted { .. }));
    }
}
