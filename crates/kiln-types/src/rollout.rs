//! Rollout types
//!
//! A Rollout is the progressive-delivery policy attached to a plan after
//! deploy: discrete traffic-weight steps advanced under health gates.

use crate::ids::{PlanId, RolloutId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Progressive-delivery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Small initial slice, widening steps
    Canary,
    /// Parallel stack, single cutover
    BlueGreen,
    /// Evenly spaced steps
    Linear,
    /// Everything at once
    Immediate,
}

impl Strategy {
    /// Default weight-step sequence for this strategy.
    pub fn default_steps(self) -> Vec<u32> {
        match self {
            Self::Canary => vec![10, 25, 50, 100],
            Self::BlueGreen => vec![0, 100],
            Self::Linear => vec![20, 40, 60, 80, 100],
            Self::Immediate => vec![100],
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Canary => "canary",
            Self::BlueGreen => "blue-green",
            Self::Linear => "linear",
            Self::Immediate => "immediate",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "canary" => Ok(Self::Canary),
            "blue-green" => Ok(Self::BlueGreen),
            "linear" => Ok(Self::Linear),
            "immediate" => Ok(Self::Immediate),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}

/// Strategy name not recognized.
#[derive(Debug, thiserror::Error)]
#[error("unknown rollout strategy: {0}")]
pub struct UnknownStrategy(pub String);

/// Status of a rollout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RolloutStatus {
    /// Advancing through weight steps
    Active,

    /// Held at the current weight
    Paused {
        /// Why the rollout was paused
        reason: String,
        /// Paused at timestamp
        paused_at: chrono::DateTime<chrono::Utc>,
    },

    /// All steps served; traffic fully shifted
    Complete,

    /// Cancelled; traffic weight reset to zero
    Aborted,
}

/// A rollout record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rollout {
    /// Unique rollout identifier
    pub id: RolloutId,

    /// Plan this rollout delivers
    pub plan: PlanId,

    /// Strategy in force
    pub strategy: Strategy,

    /// Weight steps, monotonically non-decreasing, ending at 100
    pub weight_steps: Vec<u32>,

    /// 1-based position of the next unserved step
    pub current_step: u32,

    /// Current traffic weight in `[0, 100]`
    pub current_weight: u32,

    /// Current status
    pub status: RolloutStatus,

    /// Started timestamp
    pub started_at: chrono::DateTime<chrono::Utc>,

    /// Last updated timestamp
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Rollout {
    /// Seconds since the rollout started.
    pub fn elapsed_secs(&self) -> i64 {
        (chrono::Utc::now() - self.started_at).num_seconds()
    }

    /// Whether every weight step has been served.
    pub fn steps_exhausted(&self) -> bool {
        self.current_step as usize > self.weight_steps.len()
    }
}

/// Validate a custom weight-step sequence: non-empty, monotonically
/// non-decreasing, within `[0, 100]`, ending at 100.
pub fn validate_steps(steps: &[u32]) -> bool {
    if steps.is_empty() || *steps.last().unwrap_or(&0) != 100 {
        return false;
    }
    steps.windows(2).all(|w| w[0] <= w[1]) && steps.iter().all(|w| *w <= 100)
}
