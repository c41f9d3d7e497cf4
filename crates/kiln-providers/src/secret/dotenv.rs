//! Dotenv secret backend
//!
//! Development backend reading `KEY=value` lines. Values live in memory;
//! rotation bumps the local version the same way the cloud backends do so
//! callers see a uniform contract.

use super::{FetchOutcome, RotateOutcome, SecretProvider, SecretTable};
use async_trait::async_trait;

/// Dotenv secret provider.
pub struct DotenvSecrets {
    table: SecretTable,
}

impl DotenvSecrets {
    /// Create an empty dotenv provider.
    pub fn new() -> Self {
        Self {
            table: SecretTable::new("dotenv"),
        }
    }

    /// Load `KEY=value` lines. Blank lines and `#` comments are skipped.
    pub fn load(&self, content: &str) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                self.table.put(key.trim(), value.trim());
            }
        }
    }
}

impl Default for DotenvSecrets {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretProvider for DotenvSecrets {
    fn name(&self) -> &'static str {
        "dotenv"
    }

    async fn put(&self, name: &str, value: &str) -> u64 {
        self.table.put(name, value)
    }

    async fn fetch(&self, name: &str) -> FetchOutcome {
        match self.table.fetch(name) {
            Some(secret) => FetchOutcome::Ok {
                value: secret.value,
                version: secret.version,
                lease: None,
            },
            None => FetchOutcome::NotFound,
        }
    }

    async fn rotate(&self, name: &str) -> RotateOutcome {
        match self.table.rotate(name) {
            Some(new_version) => RotateOutcome::Ok { new_version },
            None => RotateOutcome::NotFound,
        }
    }

    async fn exists(&self, name: &str) -> bool {
        self.table.exists(name)
    }

    async fn invalidate_cache(&self, name: &str) {
        self.table.invalidate(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_parses_env_lines() {
        let dotenv = DotenvSecrets::new();
        dotenv.load("# local overrides\nDB_URL=postgres://localhost\n\nAPI_KEY = abc123\n");

        assert!(dotenv.exists("DB_URL").await);
        match dotenv.fetch("API_KEY").await {
            FetchOutcome::Ok { value, version, lease } => {
                assert_eq!(value, "abc123");
                assert_eq!(version, 1);
                assert!(lease.is_none());
            }
            other => panic!("unexpected fetch: {:?}", other),
        }
        assert_eq!(dotenv.fetch("MISSING").await, FetchOutcome::NotFound);
    }
}
