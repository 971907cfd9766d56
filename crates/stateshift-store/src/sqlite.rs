//! SQLite persistence backend using rusqlite.
//!
//! Uses WAL mode by default. Every call runs on tokio's blocking pool so a
//! slow disk never stalls the async executor.
//!
//! # Example
//!
//! ```no_run
//! use stateshift_store::{Backend, SqliteBackend};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = SqliteBackend::open("legacy.db").unwrap();
//! let tag = store.write("sensors", "s1", b"temp=22.5", None).await.unwrap();
//!
//! let stored = store.read("sensors", "s1").await.unwrap().unwrap();
//! assert_eq!(stored.tag, tag);
//! # }
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use crate::concurrency::{check_clear, check_write};
use crate::error::StoreError;
use crate::traits::{Backend, StorageEntry, StoredRecord};

/// SQLite configuration options.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// SQLite journal mode. Defaults to WAL.
    pub journal_mode: JournalMode,
    /// Busy timeout in milliseconds. Defaults to 5000.
    pub busy_timeout_ms: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            journal_mode: JournalMode::Wal,
            busy_timeout_ms: 5000,
        }
    }
}

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    /// Write-ahead logging. Readers are not blocked by a writer.
    Wal,
    /// Traditional rollback journal.
    Delete,
    /// In-memory journal. No crash recovery.
    Memory,
}

impl JournalMode {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
            Self::Memory => "MEMORY",
        }
    }
}

/// SQLite persistence backend.
///
/// Wraps a `rusqlite::Connection` behind a `Mutex` for shared access.
/// Creates the schema automatically on first open.
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open (or create) a SQLite database at the given path with default config.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::open_with_config(path, SqliteConfig::default())
    }

    /// Open with custom configuration.
    pub fn open_with_config<P: AsRef<Path>>(
        path: P,
        config: SqliteConfig,
    ) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, &config)
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, &SqliteConfig::default())
    }

    fn from_connection(conn: Connection, config: &SqliteConfig) -> Result<Self, StoreError> {
        Self::init_connection(&conn, config)?;
        Self::create_schema(&conn)?;
        debug!(
            journal_mode = config.journal_mode.as_str(),
            busy_timeout_ms = config.busy_timeout_ms,
            "sqlite backend ready"
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_connection(conn: &Connection, config: &SqliteConfig) -> Result<(), StoreError> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = {};
             PRAGMA busy_timeout = {};
             PRAGMA synchronous = NORMAL;",
            config.journal_mode.as_str(),
            config.busy_timeout_ms,
        ))?;
        Ok(())
    }

    fn create_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS stateshift_records (
                record_type TEXT NOT NULL,
                key         TEXT NOT NULL,
                data        BLOB NOT NULL,
                tag         INTEGER NOT NULL,
                PRIMARY KEY (record_type, key)
            );

            CREATE TABLE IF NOT EXISTS stateshift_meta (
                name        TEXT PRIMARY KEY,
                value       INTEGER NOT NULL
            );

            INSERT OR IGNORE INTO stateshift_meta (name, value) VALUES ('last_tag', 0);",
        )?;
        Ok(())
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Backend("sqlite lock poisoned".into()))?;
            f(&mut guard)
        })
        .await?
    }

    /// Get the current journal mode.
    pub async fn journal_mode(&self) -> Result<String, StoreError> {
        self.with_conn(|conn| {
            let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
            Ok(mode)
        })
        .await
    }
}

fn current_tag(conn: &Connection, record_type: &str, key: &str) -> Result<Option<String>, StoreError> {
    let tag: Option<i64> = conn
        .query_row(
            "SELECT tag FROM stateshift_records WHERE record_type = ?1 AND key = ?2",
            params![record_type, key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(tag.map(|t| t.to_string()))
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn read(&self, record_type: &str, key: &str) -> Result<Option<StoredRecord>, StoreError> {
        let (record_type, key) = (record_type.to_string(), key.to_string());
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT data, tag FROM stateshift_records WHERE record_type = ?1 AND key = ?2",
                    params![record_type, key],
                    |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()?;
            Ok(row.map(|(record, tag)| StoredRecord {
                record,
                tag: tag.to_string(),
            }))
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
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let current = current_tag(&tx, &record_type, &key)?;
            check_write(&record_type, &key, expected.as_deref(), current.as_deref())?;

            let tag: i64 = tx.query_row(
                "UPDATE stateshift_meta SET value = value + 1 WHERE name = 'last_tag' RETURNING value",
                [],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO stateshift_records (record_type, key, data, tag)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(record_type, key)
                 DO UPDATE SET data = excluded.data, tag = excluded.tag",
                params![record_type, key, record, tag],
            )?;
            tx.commit()?;
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
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let current = current_tag(&tx, &record_type, &key)?;
            check_clear(&record_type, &key, expected.as_deref(), current.as_deref())?;
            tx.execute(
                "DELETE FROM stateshift_records WHERE record_type = ?1 AND key = ?2",
                params![record_type, key],
            )?;
            tx.commit()?;
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
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key, data, tag FROM stateshift_records
                 WHERE record_type = ?1 AND (?2 IS NULL OR key > ?2)
                 ORDER BY key
                 LIMIT ?3",
            )?;
            let page = stmt
                .query_map(params![record_type, after, limit], |row| {
                    Ok(StorageEntry {
                        record_type: record_type.clone(),
                        key: row.get(0)?,
                        record: row.get(1)?,
                        tag: row.get::<_, i64>(2)?.to_string(),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(page)
        })
        .await
    }

    async fn record_types(&self) -> Result<Vec<String>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT DISTINCT record_type FROM stateshift_records ORDER BY record_type")?;
            let types = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(types)
        })
        .await
    }
}
