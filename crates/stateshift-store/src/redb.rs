//! Pure-Rust key-value backend using [`redb`](https://docs.rs/redb).
//!
//! No C dependencies. Enable with `features = ["redb"]`.
//!
//! ```no_run
//! use stateshift_store::{Backend, RedbBackend};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = RedbBackend::open("/tmp/next.redb").unwrap();
//! store.write("sensors", "s1", b"hello", None).await.unwrap();
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use crate::concurrency::{check_clear, check_write};
use crate::error::StoreError;
use crate::traits::{Backend, StorageEntry, StoredRecord};

// ── Table definitions ───────────────────────────────────────────────

const RECORD_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("stateshift_records");
const META_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("stateshift_meta");

const LAST_TAG_KEY: &[u8] = b"last_tag";

fn err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

// ── Store ───────────────────────────────────────────────────────────

/// A pure-Rust persistence backend built on [`redb`].
///
/// Each record is stored as `tag(8) + payload` under `record_type \0 key`.
/// Every mutation runs in its own redb write transaction.
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open or create a redb database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(err)?;
        Self::init(db)
    }

    /// Create an in-memory redb database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(err)?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self, StoreError> {
        // Ensure tables exist by opening a write txn.
        let txn = db.begin_write().map_err(err)?;
        txn.open_table(RECORD_TABLE).map_err(err)?;
        txn.open_table(META_TABLE).map_err(err)?;
        txn.commit().map_err(err)?;
        debug!("redb backend ready");
        Ok(Self { db: Arc::new(db) })
    }

    /// Run `f` against the database on the blocking pool.
    async fn with_db<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Database) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db)).await?
    }
}

// ── Backend ─────────────────────────────────────────────────────────

#[async_trait]
impl Backend for RedbBackend {
    async fn read(&self, record_type: &str, key: &str) -> Result<Option<StoredRecord>, StoreError> {
        let slot = record_key(record_type, key);
        self.with_db(move |db| {
            let txn = db.begin_read().map_err(err)?;
            let table = txn.open_table(RECORD_TABLE).map_err(err)?;
            let value = table.get(slot.as_slice()).map_err(err)?;
            match value {
                Some(guard) => {
                    let (tag, record) = decode_record_value(guard.value())?;
                    Ok(Some(StoredRecord {
                        record,
                        tag: tag.to_string(),
                    }))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn write(
        &self,
        record_type: &str,
        key: &str,
        record: &[u8],
        expected: Option<&str>,
    ) -> Result<String, StoreError> {
        let (record_type, key) = (record_type.to_string(), key.to_string());
        let record = record.to_vec();
        let expected = expected.map(str::to_string);
        self.with_db(move |db| {
            let slot = record_key(&record_type, &key);
            let txn = db.begin_write().map_err(err)?;
            let tag = {
                let mut table = txn.open_table(RECORD_TABLE).map_err(err)?;
                let current = match table.get(slot.as_slice()).map_err(err)? {
                    Some(guard) => Some(decode_record_value(guard.value())?.0.to_string()),
                    None => None,
                };
                check_write(&record_type, &key, expected.as_deref(), current.as_deref())?;

                let mut meta = txn.open_table(META_TABLE).map_err(err)?;
                let last = match meta.get(LAST_TAG_KEY).map_err(err)? {
                    Some(guard) => decode_u64(guard.value())?,
                    None => 0,
                };
                let tag = last + 1;
                meta.insert(LAST_TAG_KEY, tag.to_be_bytes().as_slice())
                    .map_err(err)?;

                let value = encode_record_value(tag, &record);
                table
                    .insert(slot.as_slice(), value.as_slice())
                    .map_err(err)?;
                tag
            };
            txn.commit().map_err(err)?;
            Ok(tag.to_string())
        })
        .await
    }

    async fn clear(
        &self,
        record_type: &str,
        key: &str,
        expected: Option<&str>,
    ) -> Result<(), StoreError> {
        let (record_type, key) = (record_type.to_string(), key.to_string());
        let expected = expected.map(str::to_string);
        self.with_db(move |db| {
            let slot = record_key(&record_type, &key);
            let txn = db.begin_write().map_err(err)?;
            {
                let mut table = txn.open_table(RECORD_TABLE).map_err(err)?;
                let current = match table.get(slot.as_slice()).map_err(err)? {
                    Some(guard) => Some(decode_record_value(guard.value())?.0.to_string()),
                    None => None,
                };
                check_clear(&record_type, &key, expected.as_deref(), current.as_deref())?;
                table.remove(slot.as_slice()).map_err(err)?;
            }
            txn.commit().map_err(err)?;
            Ok(())
        })
        .await
    }

    async fn scan(
        &self,
        record_type: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StorageEntry>, StoreError> {
        let record_type = record_type.to_string();
        let after = after.map(str::to_string);
        self.with_db(move |db| {
            let txn = db.begin_read().map_err(err)?;
            let table = txn.open_table(RECORD_TABLE).map_err(err)?;

            // The smallest key strictly greater than `after` is `after \0`.
            let lower = match &after {
                Some(after) => {
                    let mut k = record_key(&record_type, after);
                    k.push(0);
                    k
                }
                None => record_key_prefix(&record_type),
            };
            let upper = record_key_prefix_upper(&record_type);
            let range = table
                .range(lower.as_slice()..upper.as_slice())
                .map_err(err)?;

            let mut page = Vec::new();
            for item in range.take(limit) {
                let (key_guard, value_guard) = item.map_err(err)?;
                let (_, key) = parse_record_key(key_guard.value()).ok_or_else(corrupt_key)?;
                let (tag, record) = decode_record_value(value_guard.value())?;
                page.push(StorageEntry {
                    record_type: record_type.clone(),
                    key: key.to_string(),
                    record,
                    tag: tag.to_string(),
                });
            }
            Ok(page)
        })
        .await
    }

    async fn record_types(&self) -> Result<Vec<String>, StoreError> {
        self.with_db(|db| {
            let txn = db.begin_read().map_err(err)?;
            let table = txn.open_table(RECORD_TABLE).map_err(err)?;

            // Jump from one record type to the next instead of visiting every key.
            let mut types = Vec::new();
            let mut lower: Vec<u8> = Vec::new();
            loop {
                let next = {
                    let mut range = table.range(lower.as_slice()..).map_err(err)?;
                    match range.next() {
                        Some(item) => {
                            let (key_guard, _) = item.map_err(err)?;
                            let (rt, _) =
                                parse_record_key(key_guard.value()).ok_or_else(corrupt_key)?;
                            Some(rt.to_string())
                        }
                        None => None,
                    }
                };
                let Some(record_type) = next else {
                    break;
                };
                lower = record_key_prefix_upper(&record_type);
                types.push(record_type);
            }
            Ok(types)
        })
        .await
    }
}

// ── Key encoding helpers ────────────────────────────────────────────

/// Record key: `record_type \0 key`
fn record_key(record_type: &str, key: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(record_type.len() + 1 + key.len());
    k.extend_from_slice(record_type.as_bytes());
    k.push(0);
    k.extend_from_slice(key.as_bytes());
    k
}

/// Lower bound for all record keys of a record type.
fn record_key_prefix(record_type: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(record_type.len() + 1);
    k.extend_from_slice(record_type.as_bytes());
    k.push(0);
    k
}

/// Upper bound (exclusive) for all record keys of a record type.
fn record_key_prefix_upper(record_type: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(record_type.len() + 1);
    k.extend_from_slice(record_type.as_bytes());
    k.push(1); // \x01 > \x00, captures everything in range
    k
}

/// Parse a record key back into `(record_type, key)`.
fn corrupt_key() -> StoreError {
    StoreError::Backend("corrupt record key".into())
}

fn parse_record_key(key: &[u8]) -> Option<(&str, &str)> {
    let pos = key.iter().position(|&b| b == 0)?;
    let record_type = std::str::from_utf8(&key[..pos]).ok()?;
    let k = std::str::from_utf8(&key[pos + 1..]).ok()?;
    Some((record_type, k))
}

// ── Value encoding helpers ──────────────────────────────────────────

/// Encode a record value: `tag(8) + payload`
fn encode_record_value(tag: u64, record: &[u8]) -> Vec<u8> {
    let mut v = Vec::with_capacity(8 + record.len());
    v.extend_from_slice(&tag.to_be_bytes());
    v.extend_from_slice(record);
    v
}

/// Decode a record value back into `(tag, payload)`.
fn decode_record_value(value: &[u8]) -> Result<(u64, Vec<u8>), StoreError> {
    if value.len() < 8 {
        return Err(StoreError::Backend("corrupt record value".into()));
    }
    let tag = decode_u64(&value[..8])?;
    Ok((tag, value[8..].to_vec()))
}

fn decode_u64(bytes: &[u8]) -> Result<u64, StoreError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Backend("corrupt tag counter".into()))?;
    Ok(u64::from_be_bytes(raw))
}

// ── Tests ───────────────────────────────────────────────────────────
