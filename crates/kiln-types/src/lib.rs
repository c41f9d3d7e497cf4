//! KILN Types - Core types for concept kit orchestration
//!
//! KILN turns declarative concept kits into running deployments: it plans a
//! dependency DAG, executes it against pluggable providers, rolls traffic
//! forward in steps, and evolves schemas with expand/migrate/contract.
//!
//! ## Architectural Boundaries
//!
//! - **kiln-planner** owns: DeployPlan records, DAG construction, execution
//! - **kiln-rollout** owns: Rollout records and weight-step progression
//! - **kiln-migration** owns: Migration records and phase transitions
//! - **kiln-providers** owns: per-backend relations (instances, stacks,
//!   secrets, artifacts)
//!
//! This crate is the shared vocabulary: records, IDs, configs, and events.
//! It performs no I/O and holds no state.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod artifact;
pub mod config;
pub mod events;
pub mod ids;
pub mod instance;
pub mod manifest;
pub mod migration;
pub mod plan;
pub mod rollout;
pub mod secret;

// Re-export main types
pub use artifact::{Artifact, Build, BuildStatus};
pub use config::{ExecuteConfig, GcConfig, IacConfig, RuntimeConfig, SchemaMode};
pub use events::{EventSource, KilnEvent, KilnEventEnvelope};
pub use ids::{
    ArtifactId, BuildId, IdSource, InstanceId, LeaseId, MigrationId, MonotonicIdSource, NodeId,
    PlanId, RandomIdSource, RolloutId,
};
pub use instance::{InstanceStatus, RuntimeInstance, VersionEntry};
pub use manifest::{ConceptEntry, KitManifest, ManifestError};
pub use migration::{Migration, MigrationPhase};
pub use plan::{DeployPlan, InverseOp, PlanNode, PlanPhase};
pub use rollout::{Rollout, RolloutStatus, Strategy, UnknownStrategy};
pub use secret::{SecretLease, SecretRecord};
