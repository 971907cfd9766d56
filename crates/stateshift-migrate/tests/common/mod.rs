#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stateshift_migrate::CancellationToken;
use stateshift_store::{Backend, MemoryBackend, StorageEntry, StoreError, StoredRecord};

/// A [`MemoryBackend`] that fails on demand.
#[derive(Default)]
pub struct Faulty {
    pub inner: MemoryBackend,
    reject_keys: Mutex<HashSet<String>>,
    fail_clears: AtomicBool,
    fail_reads: AtomicBool,
    fail_scans: AtomicBool,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
    scans_allowed: Mutex<Option<usize>>,
    write_delay: Mutex<Option<Duration>>,
    pub writes: AtomicUsize,
}

impl Faulty {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Writes to `key` fail as an invalid record.
    pub fn reject_key(&self, key: &str) {
        self.reject_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn accept_all(&self) {
        self.reject_keys.lock().unwrap().clear();
    }

    pub fn fail_clears(&self, on: bool) {
        self.fail_clears.store(on, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_scans(&self, on: bool) {
        self.fail_scans.store(on, Ordering::SeqCst);
    }

    /// Let `scans` scans succeed, then fail every later one.
    pub fn fail_scans_after(&self, scans: usize) {
        *self.scans_allowed.lock().unwrap() = Some(scans);
    }

    /// Hold each write open for `delay` after it has landed.
    pub fn slow_writes(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = Some(delay);
    }

    fn take_scan_budget(&self) -> Result<(), StoreError> {
        match self.scans_allowed.lock().unwrap().as_mut() {
            Some(0) => Err(StoreError::Unavailable("injected scan fault".into())),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Cancel `token` once `writes` writes have completed.
    pub fn cancel_after(&self, writes: usize, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((writes, token));
    }

    fn unavailable(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected fault".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Backend for Faulty {
    async fn read(&self, record_type: &str, key: &str) -> Result<Option<StoredRecord>, StoreError> {
        Self::unavailable(&self.fail_reads)?;
        self.inner.read(record_type, key).await
    }

    async fn write(
        &self,
        record_type: &str,
        key: &str,
        record: &[u8],
        expected: Option<&str>,
    ) -> Result<String, StoreError> {
        let count = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        let rejected = self.reject_keys.lock().unwrap().contains(key);
        let result = if rejected {
            Err(StoreError::InvalidRecord(format!("{key} rejected")))
        } else {
            self.inner.write(record_type, key, record, expected).await
        };
        let delay = *self.write_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((after, token)) = self.cancel_after.lock().unwrap().as_ref() {
            if count >= *after {
                token.cancel();
            }
        }
        result
    }

    async fn clear(
        &self,
        record_type: &str,
        key: &str,
        expected: Option<&str>,
    ) -> Result<(), StoreError> {
        Self::unavailable(&self.fail_clears)?;
        self.inner.clear(record_type, key, expected).await
    }

    async fn scan(
        &self,
        record_type: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StorageEntry>, StoreError> {
        Self::unavailable(&self.fail_scans)?;
        self.take_scan_budget()?;
        self.inner.scan(record_type, after, limit).await
    }

    async fn record_types(&self) -> Result<Vec<String>, StoreError> {
        self.inner.record_types().await
    }
}

/// `{A:..,B:..}` payload used across the tests.
pub fn payload(a: u32, b: u32) -> Vec<u8> {
    format!(r#"{{"A":{a},"B":{b}}}"#).into_bytes()
}
