use std::sync::Arc;

use stateshift_store::{Backend, StoredRecord};
use tracing::debug;

use crate::config::{BackendRegistry, MigrationConfig};
use crate::error::{ConfigError, ProxyError};
use crate::tag::CompoundTag;

/// A caller's view of one record, refreshed in place by every proxy call.
///
/// `tag` is the opaque compound tag; pass the state back unchanged to the
/// next call for the same key. `None` means the caller has never observed
/// the record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordState {
    /// Record payload. Filled by reads, consumed by writes.
    pub record: Vec<u8>,
    /// Opaque compound tag.
    pub tag: Option<String>,
    /// Whether the last call observed or produced a stored record.
    pub exists: bool,
}

impl RecordState {
    pub fn new(record: impl Into<Vec<u8>>) -> Self {
        Self {
            record: record.into(),
            tag: None,
            exists: false,
        }
    }

    /// Decode the compound tag. A missing tag decodes to [`CompoundTag::Neither`].
    pub fn compound_tag(&self) -> Result<CompoundTag, ProxyError> {
        match self.tag.as_deref() {
            Some(encoded) => Ok(CompoundTag::decode(encoded)?),
            None => Ok(CompoundTag::Neither),
        }
    }

    fn fill(&mut self, stored: StoredRecord, tag: impl FnOnce(String) -> CompoundTag) {
        self.record = stored.record;
        self.tag = Some(tag(stored.tag).encode());
        self.exists = true;
    }

    fn reset(&mut self) {
        self.record.clear();
        self.tag = None;
        self.exists = false;
    }
}

/// Presents two backends to callers as one.
///
/// - **read** prefers the destination and falls back to the source.
/// - **write** always targets the destination, promoting the key there.
/// - **clear** removes the record from both backends.
///
/// The proxy keeps no state of its own and takes no locks; conflicting
/// writers are caught by each backend's own tag check. Enumeration is not
/// merged: scan [`source`](Self::source) or [`destination`](Self::destination)
/// directly with [`stateshift_store::entries`].
#[derive(Clone)]
pub struct MigrationProxy {
    source: Arc<dyn Backend>,
    destination: Arc<dyn Backend>,
}

impl MigrationProxy {
    pub fn new(source: Arc<dyn Backend>, destination: Arc<dyn Backend>) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Build a proxy from named backends.
    pub fn from_config(
        registry: &BackendRegistry,
        config: &MigrationConfig,
    ) -> Result<Self, ConfigError> {
        let (source, destination) = config.resolve(registry)?;
        Ok(Self::new(source, destination))
    }

    pub fn source(&self) -> &Arc<dyn Backend> {
        &self.source
    }

    pub fn destination(&self) -> &Arc<dyn Backend> {
        &self.destination
    }

    /// Load the authoritative copy of a record into `state`.
    ///
    /// A destination error is returned as is; the proxy never falls back to
    /// the source when it cannot tell whether the destination holds the key.
    pub async fn read(
        &self,
        record_type: &str,
        key: &str,
        state: &mut RecordState,
    ) -> Result<(), ProxyError> {
        if let Some(stored) = self.destination.read(record_type, key).await? {
            debug!(record_type, key, "read served by destination");
            state.fill(stored, CompoundTag::Destination);
            return Ok(());
        }

        match self.source.read(record_type, key).await? {
            Some(stored) => {
                debug!(record_type, key, "read served by source");
                state.fill(stored, CompoundTag::Source);
            }
            None => {
                debug!(record_type, key, "record not found in either backend");
                state.reset();
            }
        }
        Ok(())
    }

    /// Write `state.record` to the destination.
    ///
    /// Only a destination-side tag is forwarded as the expected tag. A state
    /// last served by the source is written as a fresh insert, so a
    /// concurrent first writer at the destination surfaces as
    /// [`StoreError::AlreadyExists`].
    ///
    /// `state.tag` is rewritten whether or not the write succeeds: on success
    /// it names the new destination tag, on failure it carries the expected
    /// tag that was attempted so a retry repeats the same precondition.
    pub async fn write(
        &self,
        record_type: &str,
        key: &str,
        state: &mut RecordState,
    ) -> Result<(), ProxyError> {
        let expected = state.compound_tag()?.destination().map(str::to_string);
        debug!(
            record_type,
            key,
            expected = expected.as_deref(),
            "writing to destination"
        );

        let outcome = self
            .destination
            .write(record_type, key, &state.record, expected.as_deref())
            .await;

        let refreshed = match (&outcome, expected) {
            (Ok(tag), _) => CompoundTag::Destination(tag.clone()),
            (Err(_), Some(attempted)) => CompoundTag::Destination(attempted),
            (Err(_), None) => CompoundTag::Neither,
        };
        state.tag = Some(refreshed.encode());

        outcome?;
        state.exists = true;
        Ok(())
    }

    /// Remove the record from both backends.
    ///
    /// The source is cleared first, then the destination, each with its own
    /// half of the compound tag. A failure on the source side does not stop
    /// the destination attempt; any failure is reported once both ran.
    pub async fn clear(
        &self,
        record_type: &str,
        key: &str,
        state: &mut RecordState,
    ) -> Result<(), ProxyError> {
        let tag = state.compound_tag()?;

        let source_result = self.source.clear(record_type, key, tag.source()).await;
        if let Err(e) = &source_result {
            debug!(record_type, key, error = %e, "source clear failed, still clearing destination");
        }
        let destination_result = self
            .destination
            .clear(record_type, key, tag.destination())
            .await;

        match (source_result, destination_result) {
            (Ok(()), Ok(())) => {
                debug!(record_type, key, "cleared from both backends");
                state.reset();
                Ok(())
            }
            (source_side, destination_side) => Err(ProxyError::Clear {
                source_side: source_side.err(),
                destination_side: destination_side.err(),
            }),
        }
    }
}
