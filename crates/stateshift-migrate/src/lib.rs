//! # stateshift-migrate
//!
//! Move keyed records from one [`Backend`](stateshift_store::Backend) to
//! another without callers noticing.
//!
//! ## How It Works
//!
//! 1. Live traffic goes through a [`MigrationProxy`]. Reads prefer the
//!    destination and fall back to the source; writes always land in the
//!    destination; clears hit both.
//! 2. The proxy hands callers a **compound tag** ([`CompoundTag`]) recording
//!    which backend served the record, so the next write knows which
//!    backend's concurrency tag to send along.
//! 3. Historical data is copied by the [`BulkMigrator`], a re-runnable batch
//!    pass. Records already present in the destination are skipped, so a
//!    second run after a partial failure never copies or counts anything
//!    twice.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use stateshift_migrate::{MigrationProxy, RecordState};
//! use stateshift_store::{Backend, MemoryBackend};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let legacy = Arc::new(MemoryBackend::new());
//! let next = Arc::new(MemoryBackend::new());
//! legacy.write("accounts", "7", b"old", None).await.unwrap();
//!
//! let proxy = MigrationProxy::new(legacy.clone(), next.clone());
//! let mut state = RecordState::default();
//! proxy.read("accounts", "7", &mut state).await.unwrap();
//! assert_eq!(state.record, b"old");
//!
//! state.record = b"new".to_vec();
//! proxy.write("accounts", "7", &mut state).await.unwrap();
//! assert_eq!(next.read("accounts", "7").await.unwrap().unwrap().record, b"new");
//! # }
//! ```

mod config;
mod error;
mod migrator;
mod proxy;
mod tag;

pub use config::{BackendRegistry, MigrationConfig, MigratorConfig};
pub use error::{ConfigError, MigrateError, ProxyError};
pub use migrator::{BulkMigrator, MigrationStatistics};
pub use proxy::{MigrationProxy, RecordState};
pub use tag::{decode, encode, CompoundTag, MalformedTagError};

pub use tokio_util::sync::CancellationToken;
