use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use stateshift_store::{Backend, DEFAULT_PAGE_SIZE};

use crate::error::ConfigError;

/// Names the registered backends that play source and destination.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MigrationConfig {
    /// Backend records are migrated away from.
    pub source: String,
    /// Backend records are migrated into.
    pub destination: String,
}

impl MigrationConfig {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// Look both names up, failing fast on anything unresolvable.
    pub fn resolve(
        &self,
        registry: &BackendRegistry,
    ) -> Result<(Arc<dyn Backend>, Arc<dyn Backend>), ConfigError> {
        if self.source == self.destination {
            return Err(ConfigError::SameBackend(self.source.clone()));
        }
        let source = registry.resolve("source", &self.source)?;
        let destination = registry.resolve("destination", &self.destination)?;
        Ok((source, destination))
    }
}

/// Tuning for [`BulkMigrator`](crate::BulkMigrator).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MigratorConfig {
    /// Maximum number of records copied at the same time.
    pub concurrency: usize,
    /// Entries fetched from the source per scan call.
    pub page_size: usize,
    /// Restrict the pass to these record types. `None` migrates every type
    /// the source reports.
    pub record_types: Option<Vec<String>>,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            page_size: DEFAULT_PAGE_SIZE,
            record_types: None,
        }
    }
}

impl MigratorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidSetting("concurrency must be at least 1".into()));
        }
        if self.page_size == 0 {
            return Err(ConfigError::InvalidSetting("page_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Named backend instances available for migration.
///
/// ```
/// use std::sync::Arc;
/// use stateshift_migrate::{BackendRegistry, MigrationConfig};
/// use stateshift_store::MemoryBackend;
///
/// let mut registry = BackendRegistry::new();
/// registry.register("legacy", Arc::new(MemoryBackend::new())).unwrap();
///
/// let config = MigrationConfig::new("legacy", "next");
/// assert!(config.resolve(&registry).is_err());
/// ```
#[derive(Default, Clone)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under `name`. Names must be unique.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        backend: Arc<dyn Backend>,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        if self.backends.contains_key(&name) {
            return Err(ConfigError::DuplicateBackend(name));
        }
        self.backends.insert(name, backend);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Backend>> {
        self.backends.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    fn resolve(&self, role: &'static str, name: &str) -> Result<Arc<dyn Backend>, ConfigError> {
        self.get(name).ok_or_else(|| ConfigError::UnknownBackend {
            role,
            name: name.to_string(),
        })
    }
}
