//! Strongly-typed identifiers for KILN entities
//!
//! All IDs are opaque `<prefix>-<suffix>` strings wrapped in newtype structs
//! for type safety. Generation goes through an injectable [`IdSource`] so
//! that deterministic inputs produce deterministic IDs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the ID as a string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// Unique identifier for a deploy plan
    PlanId
);
string_id!(
    /// Unique identifier for a rollout
    RolloutId
);
string_id!(
    /// Unique identifier for a migration
    MigrationId
);
string_id!(
    /// Unique identifier for a runtime instance
    InstanceId
);
string_id!(
    /// Content-addressed identifier for a build artifact
    ArtifactId
);
string_id!(
    /// Unique identifier for a build record
    BuildId
);
string_id!(
    /// Unique identifier for a secret lease
    LeaseId
);
string_id!(
    /// Identifier for a node in a deploy graph (the concept name)
    NodeId
);

/// Source of fresh entity identifiers.
///
/// Orchestration components never mint IDs directly; they ask an `IdSource`
/// so that test runs with deterministic inputs observe deterministic IDs.
pub trait IdSource: Send + Sync {
    /// Produce the next identifier for the given prefix, e.g. `dp-1`.
    fn next_id(&self, prefix: &str) -> String;
}

/// Deterministic ID source: a monotonic counter per prefix.
///
/// This is the default everywhere. The first plan is always `dp-1`, the
/// first rollout `ro-1`, and so on, regardless of wall clock or randomness.
pub struct MonotonicIdSource {
    counters: Mutex<HashMap<String, u64>>,
}

impl MonotonicIdSource {
    /// Create a new source with all counters at zero.
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MonotonicIdSource {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for MonotonicIdSource {
    fn next_id(&self, prefix: &str) -> String {
        let mut counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let counter = counters.entry(prefix.to_string()).or_insert(0);
        *counter += 1;
        format!("{}-{}", prefix, counter)
    }
}

/// Random ID source backed by UUID v4.
///
/// Suitable for production multi-writer setups where counters would collide.
pub struct RandomIdSource;

impl IdSource for RandomIdSource {
    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_ids_are_sequential_per_prefix() {
        let ids = MonotonicIdSource::new();
        assert_eq!(ids.next_id("dp"), "dp-1");
        assert_eq!(ids.next_id("dp"), "dp-2");
        assert_eq!(ids.next_id("ro"), "ro-1");
        assert_eq!(ids.next_id("dp"), "dp-3");
    }

    #[test]
    fn test_random_ids_are_unique() {
        let ids = RandomIdSource;
        assert_ne!(ids.next_id("dp"), ids.next_id("dp"));
    }

    #[test]
    fn test_plan_id_display() {
        let id = PlanId::new("dp-1");
        assert_eq!(format!("{}", id), "dp-1");
        assert_eq!(id.as_str(), "dp-1");
    }
}
