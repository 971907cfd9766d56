use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A record as returned by [`Backend::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// Opaque payload.
    pub record: Vec<u8>,
    /// Backend-native concurrency tag for this version of the record.
    pub tag: String,
}

/// One entry produced while enumerating a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    /// Namespace the record belongs to.
    pub record_type: String,
    /// Caller-assigned identity within the record type.
    pub key: String,
    /// Opaque payload.
    pub record: Vec<u8>,
    /// Tag of the record at the time it was scanned.
    pub tag: String,
}

/// Core trait for keyed record storage.
///
/// Records are opaque bytes addressed by `(record_type, key)`. Every
/// mutation is guarded by an optional expected tag:
///
/// - `write(.., None)` is a fresh insert and fails with
///   [`StoreError::AlreadyExists`] if the key is occupied.
/// - `write(.., Some(tag))` fails with [`StoreError::Conflict`] unless the
///   stored record carries exactly `tag`.
/// - `clear(.., None)` removes whatever exists. `clear(.., Some(tag))`
///   fails with [`StoreError::Conflict`] when a record with another tag is
///   present, and succeeds when the key is already empty.
///
/// Tags never repeat within one backend, even across delete and re-insert.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Retrieve a record. Returns `None` if the key does not exist.
    async fn read(&self, record_type: &str, key: &str) -> Result<Option<StoredRecord>, StoreError>;

    /// Store a record and return its new tag.
    async fn write(
        &self,
        record_type: &str,
        key: &str,
        record: &[u8],
        expected: Option<&str>,
    ) -> Result<String, StoreError>;

    /// Remove a record.
    async fn clear(
        &self,
        record_type: &str,
        key: &str,
        expected: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Fetch one page of entries with keys strictly after `after`.
    ///
    /// Pages are ordered by key so that [`entries`](crate::entries) can
    /// resume from the last key it saw. Returns at most `limit` entries.
    async fn scan(
        &self,
        record_type: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StorageEntry>, StoreError>;

    /// List every record type that currently holds at least one record.
    async fn record_types(&self) -> Result<Vec<String>, StoreError>;
}
