//! Telemetry collaborator contract

use async_trait::async_trait;
use std::sync::Mutex;

/// A recorded deploy marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployMarker {
    /// Kit that was deployed
    pub kit: String,
    /// Version label (the plan ID)
    pub version: String,
    /// Target environment
    pub environment: String,
    /// Terminal status, e.g. `executed`, `rolledback`
    pub status: String,
}

/// Deploy-marker collaborator.
#[async_trait]
pub trait Telemetry: Send + Sync {
    /// Record that a kit version reached a terminal deploy status.
    async fn deploy_marker(&self, kit: &str, version: &str, environment: &str, status: &str);
}

/// Telemetry that discards markers.
pub struct NoopTelemetry;

#[async_trait]
impl Telemetry for NoopTelemetry {
    async fn deploy_marker(&self, _kit: &str, _version: &str, _environment: &str, _status: &str) {}
}

/// Telemetry that records markers in memory.
pub struct RecordingTelemetry {
    markers: Mutex<Vec<DeployMarker>>,
}

impl RecordingTelemetry {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self {
            markers: Mutex::new(Vec::new()),
        }
    }

    /// Markers recorded so far.
    pub fn markers(&self) -> Vec<DeployMarker> {
        match self.markers.lock() {
            Ok(markers) => markers.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Default for RecordingTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Telemetry for RecordingTelemetry {
    async fn deploy_marker(&self, kit: &str, version: &str, environment: &str, status: &str) {
        let marker = DeployMarker {
            kit: kit.to_string(),
            version: version.to_string(),
            environment: environment.to_string(),
            status: status.to_string(),
        };
        match self.markers.lock() {
            Ok(mut markers) => markers.push(marker),
            Err(poisoned) => poisoned.into_inner().push(marker),
        }
    }
}
