//! Lazy enumeration of the entries stored in a backend.
//!
//! The streams built here page through [`Backend::scan`] one page at a time,
//! so a consumer that stops early never loads the rest of the backend. Each
//! call starts a fresh scan from the first key. The first backend error is
//! yielded as an `Err` item and ends the stream; it is never swallowed.
//!
//! ```
//! use std::sync::Arc;
//! use futures::TryStreamExt;
//! use stateshift_store::{entries, Backend, MemoryBackend};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = Arc::new(MemoryBackend::new());
//! store.write("sensors", "s1", b"1", None).await.unwrap();
//! store.write("sensors", "s2", b"2", None).await.unwrap();
//!
//! let all: Vec<_> = entries(store, "sensors", 1).try_collect().await.unwrap();
//! assert_eq!(all.len(), 2);
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::error::StoreError;
use crate::traits::{Backend, StorageEntry};

/// Page size used when the caller has no preference.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// A lazy, finite sequence of entries.
pub type EntryStream = BoxStream<'static, Result<StorageEntry, StoreError>>;

struct Cursor {
    after: Option<String>,
    buffered: VecDeque<StorageEntry>,
    exhausted: bool,
}

/// Enumerate every entry of one record type.
pub fn entries<B>(backend: Arc<B>, record_type: impl Into<String>, page_size: usize) -> EntryStream
where
    B: Backend + ?Sized + 'static,
{
    let record_type = record_type.into();
    let page_size = page_size.max(1);
    let start = Cursor {
        after: None,
        buffered: VecDeque::new(),
        exhausted: false,
    };

    let pages = stream::try_unfold(start, move |mut cursor| {
        let backend = Arc::clone(&backend);
        let record_type = record_type.clone();
        async move {
            loop {
                if let Some(entry) = cursor.buffered.pop_front() {
                    return Ok::<_, StoreError>(Some((entry, cursor)));
                }
                if cursor.exhausted {
                    return Ok(None);
                }
                let page = backend
                    .scan(&record_type, cursor.after.as_deref(), page_size)
                    .await?;
                cursor.exhausted = page.len() < page_size;
                if let Some(last) = page.last() {
                    cursor.after = Some(last.key.clone());
                }
                cursor.buffered.extend(page);
            }
        }
    });

    pages.boxed()
}

/// Enumerate the entries of several record types, one type after another.
///
/// With `record_types = None` the backend is asked which types it holds
/// when the stream is first polled.
pub fn all_entries<B>(
    backend: Arc<B>,
    record_types: Option<Vec<String>>,
    page_size: usize,
) -> EntryStream
where
    B: Backend + ?Sized + 'static,
{
    let types: BoxStream<'static, Result<String, StoreError>> = match record_types {
        Some(types) => stream::iter(types.into_iter().map(Ok)).boxed(),
        None => {
            let lister = Arc::clone(&backend);
            stream::once(async move { lister.record_types().await })
                .map_ok(|types| stream::iter(types.into_iter().map(Ok)))
                .try_flatten()
                .boxed()
        }
    };

    let flattened = types
        .map_ok(move |record_type| entries(Arc::clone(&backend), record_type, page_size))
        .try_flatten();

    stop_after_error(flattened.boxed())
}

/// End the stream right after the first error it yields.
fn stop_after_error(inner: EntryStream) -> EntryStream {
    let mut failed = false;
    inner
        .take_while(move |item| {
            let keep = !failed;
            failed |= item.is_err();
            future::ready(keep)
        })
        .boxed()
}
