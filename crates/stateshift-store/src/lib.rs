//! # stateshift-store
//!
//! Keyed record backends for [`stateshift-migrate`](https://docs.rs/stateshift-migrate).
//!
//! Every backend stores opaque records under `(record_type, key)` and hands
//! out an opaque concurrency tag on every read and write. Writers pass the
//! tag they last observed back in; a mismatch is reported as
//! [`StoreError::Conflict`] and a fresh insert over an existing record as
//! [`StoreError::AlreadyExists`].
//!
//! ## Quick Start
//!
//! ```
//! use stateshift_store::{Backend, MemoryBackend};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = MemoryBackend::new();
//! let tag = store.write("sensors", "sensor-42", b"hello", None).await.unwrap();
//!
//! let stored = store.read("sensors", "sensor-42").await.unwrap().unwrap();
//! assert_eq!(stored.record, b"hello");
//! assert_eq!(stored.tag, tag);
//! # }
//! ```
//!
//! ## Backends
//!
//! | Backend | Feature flag | Use case |
//! |---------|-------------|----------|
//! | [`MemoryBackend`] | *(always available)* | Testing, prototyping |
//! | `SqliteBackend` | `sqlite` | Single-file relational storage |
//! | `RedbBackend` | `redb` | Pure-Rust embedded storage |

mod concurrency;
mod error;
mod memory;
#[cfg(feature = "redb")]
mod redb;
pub mod scan;
#[cfg(feature = "sqlite")]
mod sqlite;
mod traits;

pub use error::StoreError;
pub use memory::MemoryBackend;
#[cfg(feature = "redb")]
pub use redb::RedbBackend;
pub use scan::{all_entries, entries, EntryStream, DEFAULT_PAGE_SIZE};
#[cfg(feature = "sqlite")]
pub use sqlite::{JournalMode, SqliteBackend, SqliteConfig};
pub use traits::*;
