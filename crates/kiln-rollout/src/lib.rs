//! KILN Rollout - Progressive-delivery controller
//!
//! Owns the policy between deploy and the live endpoint: shift traffic
//! weights in discrete steps, react to health signals, and support safe
//! pause/resume/abort.
//!
//! ## Architectural Boundaries
//!
//! - `kiln-planner` owns: getting the plan deployed in the first place
//! - `kiln-rollout` owns: Rollout records and weight-step progression
//! - `kiln-providers` owns: actually shifting traffic on an instance
//!
//! The controller never touches instances directly; traffic changes go
//! through the runtime provider contract.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod controller;

pub use controller::{
    AbortOutcome, AdvanceOutcome, BeginOutcome, PauseOutcome, ResumeOutcome, RolloutController,
    RolloutStatusView,
};
