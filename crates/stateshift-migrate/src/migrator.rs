use std::fmt;
use std::sync::Arc;

use futures::future::{self, Either};
use futures::StreamExt;
use serde::Serialize;
use stateshift_store::{all_entries, Backend, StorageEntry, StoreError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{BackendRegistry, MigrationConfig, MigratorConfig};
use crate::error::{ConfigError, MigrateError};

/// Tally of one [`BulkMigrator::migrate_all`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStatistics {
    /// Entries copied into the destination during this pass.
    pub migrated: u64,
    /// Entries the destination already held.
    pub skipped: u64,
    /// Entries whose copy failed for any other reason.
    pub failed: u64,
}

impl MigrationStatistics {
    /// Number of entries the pass attempted.
    pub fn total(&self) -> u64 {
        self.migrated + self.skipped + self.failed
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Migrated => self.migrated += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed => self.failed += 1,
        }
    }
}

impl fmt::Display for MigrationStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "migrated={} skipped={} failed={}",
            self.migrated, self.skipped, self.failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Migrated,
    Skipped,
    Failed,
}

/// Copies every source entry the destination does not hold yet.
///
/// Each entry is inserted into the destination with no expected tag. The
/// destination rejects keys it already has, and those count as skipped, so
/// re-running a pass after a partial failure only copies what is missing.
/// Entries written through a [`MigrationProxy`](crate::MigrationProxy) in
/// the meantime are never overwritten.
pub struct BulkMigrator {
    source: Arc<dyn Backend>,
    destination: Arc<dyn Backend>,
    config: MigratorConfig,
}

impl BulkMigrator {
    pub fn new(
        source: Arc<dyn Backend>,
        destination: Arc<dyn Backend>,
        config: MigratorConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            source,
            destination,
            config,
        })
    }

    /// Build a migrator from named backends.
    pub fn from_config(
        registry: &BackendRegistry,
        migration: &MigrationConfig,
        config: MigratorConfig,
    ) -> Result<Self, ConfigError> {
        let (source, destination) = migration.resolve(registry)?;
        Self::new(source, destination, config)
    }

    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    /// Run one pass over the source.
    ///
    /// Per-entry failures are counted and never stop the pass. Cancelling
    /// `cancel` stops the pass before the next entry is started; copies
    /// already in flight finish and are counted, and the partial tally is
    /// returned as `Ok`. Only a failure to enumerate the source ends the
    /// pass with an error. It is returned once the copies in flight have
    /// finished, and carries their outcomes in the partial tally.
    pub async fn migrate_all(
        &self,
        cancel: &CancellationToken,
    ) -> Result<MigrationStatistics, MigrateError> {
        info!(
            concurrency = self.config.concurrency,
            page_size = self.config.page_size,
            "bulk migration started"
        );

        let copies = all_entries(
            Arc::clone(&self.source),
            self.config.record_types.clone(),
            self.config.page_size,
        )
        .take_until(cancel.cancelled())
        .map(|item| match item {
            Ok(entry) => Either::Left(self.copy_entry(entry, cancel)),
            Err(e) => Either::Right(future::ready(Err(e))),
        })
        .buffer_unordered(self.config.concurrency);
        futures::pin_mut!(copies);

        // The enumeration ends after its first error; copies already in
        // flight are still drained so the tally matches the destination.
        let mut statistics = MigrationStatistics::default();
        let mut enumeration_error = None;
        while let Some(result) = copies.next().await {
            match result {
                Ok(Some(outcome)) => statistics.record(outcome),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "source enumeration failed, draining copies in flight");
                    enumeration_error.get_or_insert(e);
                }
            }
        }

        if let Some(source) = enumeration_error {
            warn!(%statistics, "bulk migration aborted");
            return Err(MigrateError::Enumeration { statistics, source });
        }

        if cancel.is_cancelled() {
            info!(%statistics, "bulk migration cancelled");
        } else {
            info!(%statistics, "bulk migration finished");
        }
        Ok(statistics)
    }

    /// Copy one entry. `None` means cancellation arrived before the write
    /// was started.
    async fn copy_entry(
        &self,
        entry: StorageEntry,
        cancel: &CancellationToken,
    ) -> Result<Option<Outcome>, StoreError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let StorageEntry {
            record_type,
            key,
            record,
            ..
        } = entry;
        let (record_type, key) = (record_type.as_str(), key.as_str());
        let outcome = match self
            .destination
            .write(record_type, key, &record, None)
            .await
        {
            Ok(_) => {
                debug!(record_type, key, "migrated");
                Outcome::Migrated
            }
            Err(e) if e.is_already_exists() => {
                debug!(record_type, key, "already in destination, skipped");
                Outcome::Skipped
            }
            Err(e) => {
                warn!(record_type, key, error = %e, "failed to migrate entry");
                Outcome::Failed
            }
        };
        Ok(Some(outcome))
    }
}
