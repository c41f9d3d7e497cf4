//! Emitter collaborator contract
//!
//! The core never writes files directly; all file output - generated IaC,
//! GitOps manifests, source trees - is routed through an Emitter. The
//! production emitter lives outside the core; [`NullEmitter`] discards and
//! [`RecordingEmitter`] captures for tests.

use async_trait::async_trait;
use dashmap::DashMap;

/// A file written through the emitter, as recorded for tracing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    /// Output path
    pub path: String,
    /// File content
    pub content: String,
    /// Formatting hint (`yaml`, `json`, `typescript`, ...)
    pub format_hint: String,
    /// Source paths this output was derived from
    pub sources: Vec<String>,
}

/// File-output collaborator.
#[async_trait]
pub trait Emitter: Send + Sync {
    /// Write one output file.
    async fn write(&self, path: &str, content: &str, format_hint: &str, sources: &[String]);

    /// Source paths a given output was derived from.
    async fn trace(&self, output_path: &str) -> Vec<String>;

    /// Output paths affected by a change to the given source.
    async fn affected(&self, source_path: &str) -> Vec<String>;
}

/// Emitter that discards all output.
pub struct NullEmitter;

#[async_trait]
impl Emitter for NullEmitter {
    async fn write(&self, _path: &str, _content: &str, _format_hint: &str, _sources: &[String]) {}

    async fn trace(&self, _output_path: &str) -> Vec<String> {
        Vec::new()
    }

    async fn affected(&self, _source_path: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Emitter that records every write in memory.
pub struct RecordingEmitter {
    files: DashMap<String, WrittenFile>,
}

impl RecordingEmitter {
    /// Create an empty recording emitter.
    pub fn new() -> Self {
        Self {
            files: DashMap::new(),
        }
    }

    /// All files written so far, sorted by path.
    pub fn files(&self) -> Vec<WrittenFile> {
        let mut files: Vec<_> = self.files.iter().map(|f| f.value().clone()).collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    /// A single written file by path.
    pub fn file(&self, path: &str) -> Option<WrittenFile> {
        self.files.get(path).map(|f| f.clone())
    }
}

impl Default for RecordingEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Emitter for RecordingEmitter {
    async fn write(&self, path: &str, content: &str, format_hint: &str, sources: &[String]) {
        self.files.insert(
            path.to_string(),
            WrittenFile {
                path: path.to_string(),
                content: content.to_string(),
                format_hint: format_hint.to_string(),
                sources: sources.to_vec(),
            },
        );
    }

    async fn trace(&self, output_path: &str) -> Vec<String> {
        self.files
            .get(output_path)
            .map(|f| f.sources.clone())
            .unwrap_or_default()
    }

    async fn affected(&self, source_path: &str) -> Vec<String> {
        let mut affected: Vec<_> = self
            .files
            .iter()
            .filter(|f| f.sources.iter().any(|s| s == source_path))
            .map(|f| f.path.clone())
            .collect();
        affected.sort();
        affected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_emitter_trace_and_affected() {
        let emitter = RecordingEmitter::new();
        emitter
            .write(
                "out/a.yaml",
                "a: 1",
                "yaml",
                &["concepts/a.concept".to_string()],
            )
            .await;
        emitter
            .write(
                "out/b.yaml",
                "b: 2",
                "yaml",
                &["concepts/a.concept".to_string(), "concepts/b.concept".to_string()],
            )
            .await;

        assert_eq!(
            emitter.trace("out/a.yaml").await,
            vec!["concepts/a.concept".to_string()]
        );
        assert_eq!(
            emitter.affected("concepts/a.concept").await,
            vec!["out/a.yaml".to_string(), "out/b.yaml".to_string()]
        );
        assert!(emitter.affected("concepts/zzz.concept").await.is_empty());
    }
}
