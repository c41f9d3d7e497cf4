//! Kit manifest parsing
//!
//! A kit manifest names the set of concepts to deploy together, their
//! runtime targets, and the dependency edges between them. The manifest
//! arrives as an opaque JSON string; parsing rejects unknown fields.

use crate::config::RuntimeConfig;
use serde::{Deserialize, Serialize};

/// A parsed kit manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KitManifest {
    /// Kit name
    pub kit: String,

    /// Concepts to deploy
    #[serde(default)]
    pub concepts: Vec<ConceptEntry>,
}

/// A single concept deployment unit within a kit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConceptEntry {
    /// Concept name (doubles as the graph node ID)
    pub concept: String,

    /// Runtime backend name (`lambda`, `cloud_run`, `kubernetes`, ...)
    pub runtime: String,

    /// Optional IaC backend for this concept's infrastructure
    #[serde(default)]
    pub iac: Option<String>,

    /// Optional secret backend this concept reads from
    #[serde(default)]
    pub secret_provider: Option<String>,

    /// Artifact reference to deploy; a runtime-appropriate default is
    /// derived from the concept name when omitted
    #[serde(default)]
    pub artifact: Option<String>,

    /// Declared schema (JSON object of field name to type) used for
    /// compatibility validation against the deployed version
    #[serde(default)]
    pub schema: Option<String>,

    /// Concepts that must deploy before this one
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Runtime configuration
    #[serde(default)]
    pub config: RuntimeConfig,
}

impl KitManifest {
    /// Parse a manifest from its JSON wire form.
    pub fn parse(raw: &str) -> Result<Self, ManifestError> {
        if raw.trim().is_empty() {
            return Err(ManifestError::Empty);
        }
        let manifest: Self =
            serde_json::from_str(raw).map_err(|e| ManifestError::Malformed(e.to_string()))?;
        if manifest.kit.trim().is_empty() {
            return Err(ManifestError::Empty);
        }
        Ok(manifest)
    }

    /// Whether the manifest names any concepts at all.
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }
}

/// Manifest parse failures.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest is empty")]
    Empty,

    #[error("manifest is malformed: {0}")]
    Malformed(String),
}
