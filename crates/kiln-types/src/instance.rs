//! Runtime instance types
//!
//! A RuntimeInstance is one provisioned deployment target for a concept on a
//! particular runtime backend. Exactly one record exists per
//! (concept, runtime type); deploys preserve version history so rollback can
//! pop back to the previous version.

use crate::ids::InstanceId;
use serde::{Deserialize, Serialize};

/// Status of a runtime instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Provisioned but nothing deployed yet
    Provisioned,
    /// Serving a deployed version
    Deployed,
    /// Terminated
    Destroyed,
}

/// One entry in an instance's deploy history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// Version label, e.g. `v1`
    pub version: String,

    /// Artifact reference deployed under this version
    pub artifact: String,

    /// Deployed timestamp
    pub deployed_at: chrono::DateTime<chrono::Utc>,
}

/// A runtime instance record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeInstance {
    /// Unique instance identifier
    pub id: InstanceId,

    /// Concept this instance serves
    pub concept: String,

    /// Runtime backend name
    pub runtime_type: String,

    /// Endpoint URL in the backend's convention
    pub endpoint: String,

    /// Currently served version, if anything is deployed
    pub current_version: Option<String>,

    /// Artifact reference behind `current_version`
    pub current_artifact: Option<String>,

    /// Traffic weight in `[0, 100]`
    pub traffic_weight: u32,

    /// Lifecycle status
    pub status: InstanceStatus,

    /// Previous versions, append-only, newest last
    pub history: Vec<VersionEntry>,

    /// Created timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// Last updated timestamp
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl RuntimeInstance {
    /// Sequential version label for the next deploy (`v1`, `v2`, ...).
    pub fn next_version_label(&self) -> String {
        let deployed = self.history.len() + usize::from(self.current_version.is_some());
        format!("v{}", deployed + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_version_label_counts_history() {
        let mut instance = RuntimeInstance {
            id: InstanceId::new("lambda-1"),
            concept: "User".to_string(),
            runtime_type: "lambda".to_string(),
            endpoint: "https://example".to_string(),
            current_version: None,
            current_artifact: None,
            traffic_weight: 0,
            status: InstanceStatus::Provisioned,
            history: Vec::new(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        assert_eq!(instance.next_version_label(), "v1");

        instance.current_version = Some("v1".to_string());
        assert_eq!(instance.next_version_label(), "v2");

        instance.history.push(VersionEntry {
            version: "v1".to_string(),
            artifact: "a".to_string(),
            deployed_at: chrono::Utc::now(),
        });
        instance.current_version = Some("v2".to_string());
        assert_eq!(instance.next_version_label(), "v3");
    }
}
