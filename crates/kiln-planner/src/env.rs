//! Environment resolution contract
//!
//! Environments are resolved by an external Env sub-service; the core only
//! fixes the contract. [`StaticEnvResolver`] is the in-memory resolver used
//! in tests and local development.

use dashmap::DashMap;
use kiln_types::SchemaMode;

/// A resolved target environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    /// Environment name
    pub name: String,
    /// Default region for nodes that do not override it
    pub region: String,
    /// Schema compatibility requirement for deploys into this environment
    pub schema_mode: SchemaMode,
}

/// Environment-resolution collaborator.
pub trait EnvResolver: Send + Sync {
    /// Resolve an environment name, if known.
    fn resolve(&self, name: &str) -> Option<Environment>;
}

/// In-memory resolver over a fixed environment table.
pub struct StaticEnvResolver {
    environments: DashMap<String, Environment>,
}

impl StaticEnvResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self {
            environments: DashMap::new(),
        }
    }

    /// Resolver preloaded with the conventional three environments:
    /// `dev` (no schema requirement), `staging` (backward), `prod` (full).
    pub fn with_defaults() -> Self {
        let resolver = Self::new();
        resolver.insert(Environment {
            name: "dev".to_string(),
            region: "us-east-1".to_string(),
            schema_mode: SchemaMode::None,
        });
        resolver.insert(Environment {
            name: "staging".to_string(),
            region: "us-east-1".to_string(),
            schema_mode: SchemaMode::Backward,
        });
        resolver.insert(Environment {
            name: "prod".to_string(),
            region: "us-east-1".to_string(),
            schema_mode: SchemaMode::Full,
        });
        resolver
    }

    /// Add or replace an environment.
    pub fn insert(&self, environment: Environment) {
        self.environments
            .insert(environment.name.clone(), environment);
    }
}

impl Default for StaticEnvResolver {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl EnvResolver for StaticEnvResolver {
    fn resolve(&self, name: &str) -> Option<Environment> {
        self.environments.get(name).map(|e| e.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_environments() {
        let resolver = StaticEnvResolver::with_defaults();
        assert_eq!(
            resolver.resolve("staging").unwrap().schema_mode,
            SchemaMode::Backward
        );
        assert_eq!(
            resolver.resolve("prod").unwrap().schema_mode,
            SchemaMode::Full
        );
        assert!(resolver.resolve("moon-base").is_none());
    }
}
