//! KILN Store - Typed relation-keyed record store
//!
//! Every KILN subsystem coordinates through typed relations: named maps from
//! record ID to a record struct. Each relation has exactly one owner; the
//! store itself is only the coordination medium.
//!
//! ## Guarantees
//!
//! - A `put` completes before the next `get` of the same key observes
//!   anything.
//! - `update` runs its closure under the entry lock, so a single operation
//!   is atomic with respect to other operations on the same (relation, id).
//! - Relations are in-memory and non-blocking; operations complete or fail
//!   immediately.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod relation;

pub use relation::{Relation, StoreError, StoreResult};
