//! KILN Migration - Expand/migrate/contract schema evolution
//!
//! Zero-downtime schema evolution between concept versions runs in three
//! forward-only phases: additive change, data copy, legacy removal. Each
//! phase is idempotent; re-invoking a completed phase is an Ok no-op.
//!
//! The engine coordinates phases and owns the `migration` relation; the
//! actual data plane is behind the [`MigrationTarget`] trait.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod engine;
pub mod target;

pub use engine::{
    ContractOutcome, ExpandOutcome, MigrateOutcome, MigrationEngine, MigrationStatusView,
    PlanMigrationOutcome,
};
pub use target::{CopyReport, InMemoryMigrationTarget, MigrationTarget};
