//! KILN Planner - Manifest to DAG to deployed kit
//!
//! The orchestrator over everything else: transform a kit manifest into an
//! executable dependency DAG, validate it against the target environment's
//! schema rules, execute nodes in dependency order against the provider
//! registry, and unwind cleanly when a node fails.
//!
//! ## Architectural Boundaries
//!
//! - `kiln-planner` owns: DeployPlan records, DAG construction, execution,
//!   rollback bookkeeping
//! - `kiln-providers` owns: what provision/deploy/teardown actually mean
//!   per backend
//! - `kiln-rollout` owns: traffic progression after a plan is executed
//!
//! File output (IaC, GitOps manifests) always goes through the Emitter
//! contract; the planner never writes files.
//!
//! ## Usage
//!
//! ```no_run
//! use kiln_planner::{Planner, StaticEnvResolver, NoopTelemetry};
//! use kiln_providers::ProviderRegistry;
//! use kiln_types::{ExecuteConfig, MonotonicIdSource};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let ids = Arc::new(MonotonicIdSource::new());
//! let planner = Planner::new(
//!     Arc::new(ProviderRegistry::with_defaults(ids.clone())),
//!     Arc::new(StaticEnvResolver::with_defaults()),
//!     Arc::new(NoopTelemetry),
//!     ids,
//! );
//!
//! let manifest = r#"{"kit": "auth", "concepts": [
//!     {"concept": "User", "runtime": "lambda"}
//! ]}"#;
//! // let outcome = planner.plan(manifest, "staging").await;
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod env;
pub mod executor;
pub mod graph;
pub mod planner;
pub mod telemetry;

// Re-exports
pub use env::{EnvResolver, Environment, StaticEnvResolver};
pub use executor::{ExecuteOutcome, RollbackPlanOutcome};
pub use graph::{DeployGraph, GraphError};
pub use planner::{
    GitOpsOutcome, InfraOutcome, PlanOutcome, Planner, StatusOutcome, ValidateOutcome,
};
pub use telemetry::{DeployMarker, NoopTelemetry, RecordingTelemetry, Telemetry};
