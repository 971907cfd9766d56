use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::concurrency::{check_clear, check_write};
use crate::error::StoreError;
use crate::traits::{Backend, StorageEntry, StoredRecord};

/// In-memory storage backend.
///
/// All records live in a `BTreeMap`; nothing touches disk.
/// Ideal for testing and prototyping.
///
/// # Example
///
/// ```
/// use stateshift_store::{Backend, MemoryBackend};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MemoryBackend::new();
/// store.write("sensors", "s1", b"temp=22.5", None).await.unwrap();
///
/// let stored = store.read("sensors", "s1").await.unwrap().unwrap();
/// assert_eq!(stored.record, b"temp=22.5");
/// # }
/// ```
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

struct Inner {
    /// (record_type, key) -> record
    records: BTreeMap<(String, String), Slot>,
    /// Last tag handed out.
    last_tag: u64,
}

struct Slot {
    data: Vec<u8>,
    tag: u64,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                records: BTreeMap::new(),
                last_tag: 0,
            }),
        }
    }

    /// Returns the total number of records across all record types.
    ///
    /// Still answers after a panic poisoned the lock: every mutation is a
    /// single map insert or remove, so the map is never left half-updated.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory lock poisoned".into()))
    }

    fn slot_key(record_type: &str, key: &str) -> (String, String) {
        (record_type.to_string(), key.to_string())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn read(&self, record_type: &str, key: &str) -> Result<Option<StoredRecord>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .records
            .get(&Self::slot_key(record_type, key))
            .map(|slot| StoredRecord {
                record: slot.data.clone(),
                tag: slot.tag.to_string(),
            }))
    }

    async fn write(
        &self,
        record_type: &str,
        key: &str,
        record: &[u8],
        expected: Option<&str>,
    ) -> Result<String, StoreError> {
        let mut inner = self.lock()?;
        let slot_key = Self::slot_key(record_type, key);
        let current = inner.records.get(&slot_key).map(|slot| slot.tag.to_string());
        check_write(record_type, key, expected, current.as_deref())?;

        inner.last_tag += 1;
        let tag = inner.last_tag;
        inner.records.insert(
            slot_key,
            Slot {
                data: record.to_vec(),
                tag,
            },
        );
        Ok(tag.to_string())
    }

    async fn clear(
        &self,
        record_type: &str,
        key: &str,
        expected: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let slot_key = Self::slot_key(record_type, key);
        let current = inner.records.get(&slot_key).map(|slot| slot.tag.to_string());
        check_clear(record_type, key, expected, current.as_deref())?;
        inner.records.remove(&slot_key);
        Ok(())
    }

    async fn scan(
        &self,
        record_type: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StorageEntry>, StoreError> {
        let inner = self.lock()?;
        let lower = match after {
            Some(after) => Bound::Excluded(Self::slot_key(record_type, after)),
            None => Bound::Included(Self::slot_key(record_type, "")),
        };
        let page = inner
            .records
            .range((lower, Bound::Unbounded))
            .take_while(|((rt, _), _)| rt == record_type)
            .take(limit)
            .map(|((rt, key), slot)| StorageEntry {
                record_type: rt.clone(),
                key: key.clone(),
                record: slot.data.clone(),
                tag: slot.tag.to_string(),
            })
            .collect();
        Ok(page)
    }

    async fn record_types(&self) -> Result<Vec<String>, StoreError> {
        let inner = self.lock()?;
        let types: BTreeSet<&String> = inner.records.keys().map(|(rt, _)| rt).collect();
        Ok(types.into_iter().cloned().collect())
    }
}
