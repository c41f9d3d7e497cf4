//! Per-operation configuration structs
//!
//! Every orchestration operation takes a config struct whose recognized
//! options are enumerated here. Unrecognized fields are rejected at parse
//! time via `deny_unknown_fields`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for a runtime deployment unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RuntimeConfig {
    /// Memory allocation in megabytes
    pub memory_mb: u32,
    /// Invocation timeout in seconds
    pub timeout_secs: u32,
    /// Target region
    pub region: String,
    /// Environment variables passed to the workload
    pub env: BTreeMap<String, String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            memory_mb: 256,
            timeout_secs: 30,
            region: "us-east-1".to_string(),
            env: BTreeMap::new(),
        }
    }
}

/// Configuration for infrastructure-as-code operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct IacConfig {
    /// Capabilities granted by the caller (e.g. `CAPABILITY_IAM`)
    pub capabilities: Vec<String>,
    /// Optional backend configuration reference
    pub backend_config: Option<String>,
}

/// Configuration for plan execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ExecuteConfig {
    /// Maximum DAG nodes in flight at once within a plan
    pub max_parallel: usize,
    /// Whether transient provider failures are retried once with backoff
    pub retry_transient: bool,
}

impl Default for ExecuteConfig {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            retry_transient: true,
        }
    }
}

/// Configuration for artifact garbage collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GcConfig {
    /// Only artifacts older than this many seconds are candidates
    pub older_than_secs: u64,
    /// Newest records per concept that are always kept
    pub keep_versions: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            older_than_secs: 86_400,
            keep_versions: 3,
        }
    }
}

/// Schema compatibility mode for plan validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaMode {
    /// New readers accept old data
    Backward,
    /// Old readers accept new data
    Forward,
    /// Both directions
    Full,
    /// No compatibility requirement; failures are warnings only
    None,
}

impl SchemaMode {
    /// Whether an incompatibility under this mode fails validation.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Backward | Self::Forward | Self::Full)
    }
}
