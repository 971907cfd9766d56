//! The `stateshift.toml` file read by every subcommand.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use stateshift_migrate::{BackendRegistry, MigrationConfig, MigratorConfig};
use stateshift_store::{
    Backend, JournalMode, MemoryBackend, RedbBackend, SqliteBackend, SqliteConfig,
};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    pub backends: BTreeMap<String, BackendEntry>,
    pub migration: MigrationConfig,
    #[serde(default)]
    pub migrator: MigratorConfig,
}

/// How to open one named backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendEntry {
    Sqlite {
        path: PathBuf,
        #[serde(default)]
        journal_mode: Option<String>,
        #[serde(default)]
        busy_timeout_ms: Option<u32>,
    },
    Redb {
        path: PathBuf,
    },
    /// Process-local and empty on every run. Handy for dry runs.
    Memory,
}

impl CliConfig {
    /// Read and parse a config file. Relative backend paths are resolved
    /// against the directory holding the file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| format!("cannot read config {}: {e}", path.display()))?;
        let mut config = Self::parse(&raw)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.migrator.validate()?;
        Ok(config)
    }

    fn rebase(&mut self, base: &Path) {
        for entry in self.backends.values_mut() {
            if let BackendEntry::Sqlite { path, .. } | BackendEntry::Redb { path } = entry {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        }
    }

    /// Open every configured backend.
    pub fn registry(&self) -> Result<BackendRegistry> {
        let mut registry = BackendRegistry::new();
        for (name, entry) in &self.backends {
            let backend = entry
                .open()
                .map_err(|e| format!("cannot open backend {name:?}: {e}"))?;
            registry.register(name.clone(), backend)?;
        }
        Ok(registry)
    }
}

impl BackendEntry {
    pub fn open(&self) -> Result<Arc<dyn Backend>> {
        let backend: Arc<dyn Backend> = match self {
            Self::Sqlite {
                path,
                journal_mode,
                busy_timeout_ms,
            } => {
                let mut config = SqliteConfig::default();
                if let Some(mode) = journal_mode {
                    config.journal_mode = parse_journal_mode(mode)?;
                }
                if let Some(ms) = busy_timeout_ms {
                    config.busy_timeout_ms = *ms;
                }
                Arc::new(SqliteBackend::open_with_config(path, config)?)
            }
            Self::Redb { path } => Arc::new(RedbBackend::open(path)?),
            Self::Memory => Arc::new(MemoryBackend::new()),
        };
        Ok(backend)
    }
}

fn parse_journal_mode(mode: &str) -> Result<JournalMode> {
    match mode.to_ascii_lowercase().as_str() {
        "wal" => Ok(JournalMode::Wal),
        "delete" => Ok(JournalMode::Delete),
        "memory" => Ok(JournalMode::Memory),
        other => Err(format!("unknown journal_mode {other:?}").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [backends.legacy]
        kind = "sqlite"
        path = "legacy.db"
        journal_mode = "delete"

        [backends.next]
        kind = "redb"
        path = "/var/lib/next.redb"

        [backends.scratch]
        kind = "memory"

        [migration]
        source = "legacy"
        destination = "next"

        [migrator]
        concurrency = 4
    "#;

    #[test]
    fn parses_sample() {
        let config = CliConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.backends.len(), 3);
        assert_eq!(config.backends["scratch"], BackendEntry::Memory);
        assert_eq!(config.migration, MigrationConfig::new("legacy", "next"));
        assert_eq!(config.migrator.concurrency, 4);
        assert_eq!(config.migrator.page_size, MigratorConfig::default().page_size);
    }

    #[test]
    fn migrator_section_is_optional() {
        let raw = r#"
            [backends.a]
            kind = "memory"
            [backends.b]
            kind = "memory"
            [migration]
            source = "a"
            destination = "b"
        "#;
        let config = CliConfig::parse(raw).unwrap();
        assert_eq!(config.migrator, MigratorConfig::default());
    }

    #[test]
    fn rejects_unknown_kind_and_zero_concurrency() {
        let unknown = r#"
            [backends.a]
            kind = "postgres"
            [migration]
            source = "a"
            destination = "a"
        "#;
        assert!(CliConfig::parse(unknown).is_err());

        let zero = SAMPLE.replace("concurrency = 4", "concurrency = 0");
        assert!(CliConfig::parse(&zero).is_err());
    }

    #[test]
    fn relative_paths_follow_the_config_file() {
        let mut config = CliConfig::parse(SAMPLE).unwrap();
        config.rebase(Path::new("/etc/stateshift"));
        match &config.backends["legacy"] {
            BackendEntry::Sqlite { path, .. } => {
                assert_eq!(path, Path::new("/etc/stateshift/legacy.db"))
            }
            other => panic!("unexpected entry {other:?}"),
        }
        match &config.backends["next"] {
            BackendEntry::Redb { path } => assert_eq!(path, Path::new("/var/lib/next.redb")),
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[test]
    fn opens_on_disk_backends() {
        let dir = tempfile::tempdir().unwrap();
        let raw = SAMPLE.replace("/var/lib/next.redb", "next.redb");
        fs::write(dir.path().join("stateshift.toml"), raw).unwrap();

        let config = CliConfig::load(&dir.path().join("stateshift.toml")).unwrap();
        let registry = config.registry().unwrap();
        assert!(registry.get("legacy").is_some());
        assert!(registry.get("next").is_some());
        assert!(dir.path().join("legacy.db").exists());
        assert!(dir.path().join("next.redb").exists());
    }
}
