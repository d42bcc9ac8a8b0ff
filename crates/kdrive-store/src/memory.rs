//! MemoryObjectStore - in-process buckets for tests
//!
//! Behaves like a real store (missing buckets and keys are errors) and
//! adds what engine tests need to observe and disturb it:
//!
//! - per-operation call counters
//! - the peak number of concurrent `get`/`put` calls
//! - an artificial per-call latency for transfers, and a separate one for
//!   listings
//! - failure injection: [`set_unavailable`](MemoryObjectStore::set_unavailable)
//!   fails every call, [`fail_next_puts`](MemoryObjectStore::fail_next_puts)
//!   and [`fail_next_gets`](MemoryObjectStore::fail_next_gets) fail a
//!   fixed number of upcoming transfers. Injected failures are
//!   [`StoreError::Unavailable`] and therefore transient.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use kdrive_core::domain::BucketName;
use kdrive_core::ports::{IObjectStore, RemoteObject, StoreError};

type Bucket = HashMap<String, RemoteObject>;

/// In-memory object store with instrumentation
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    buckets: Mutex<HashMap<String, Bucket>>,
    latency: Mutex<Duration>,
    list_latency: Mutex<Duration>,
    unavailable: AtomicBool,
    failing_puts: AtomicUsize,
    failing_gets: AtomicUsize,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    put_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryObjectStore {
    /// Creates a store with no buckets
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding one empty bucket
    pub fn with_bucket(bucket: &str) -> Self {
        let store = Self::new();
        store.create_bucket(bucket);
        store
    }

    /// Creates an empty bucket if it does not exist
    pub fn create_bucket(&self, bucket: &str) {
        self.lock_buckets().entry(bucket.to_string()).or_default();
    }

    /// Seeds an object directly, bypassing counters and failure injection
    pub fn insert(&self, bucket: &str, key: &str, data: &[u8]) {
        self.insert_at(bucket, key, data, Utc::now());
    }

    /// Seeds an object with an explicit last-modified time
    pub fn insert_at(&self, bucket: &str, key: &str, data: &[u8], last_modified: DateTime<Utc>) {
        self.lock_buckets().entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            RemoteObject {
                data: data.to_vec(),
                last_modified,
            },
        );
    }

    /// Returns a copy of an object, bypassing counters and failure injection
    pub fn object(&self, bucket: &str, key: &str) -> Option<RemoteObject> {
        self.lock_buckets()
            .get(bucket)
            .and_then(|b| b.get(key))
            .cloned()
    }

    /// Sorted keys of a bucket, bypassing counters and failure injection
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .lock_buckets()
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Makes every subsequent call fail (or succeed again)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fails the next `n` `put` calls
    pub fn fail_next_puts(&self, n: usize) {
        self.failing_puts.store(n, Ordering::SeqCst);
    }

    /// Fails the next `n` `get` calls
    pub fn fail_next_gets(&self, n: usize) {
        self.failing_gets.store(n, Ordering::SeqCst);
    }

    /// Delays every `get` and `put` by `latency`
    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut guard) = self.latency.lock() {
            *guard = latency;
        }
    }

    /// Delays every `list` by `latency`
    pub fn set_list_latency(&self, latency: Duration) {
        if let Ok(mut guard) = self.list_latency.lock() {
            *guard = latency;
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Total number of store calls of any kind
    pub fn total_calls(&self) -> usize {
        self.list_calls() + self.get_calls() + self.put_calls()
    }

    /// Highest number of `get`/`put` calls observed running at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn lock_buckets(&self) -> std::sync::MutexGuard<'_, HashMap<String, Bucket>> {
        // A poisoned lock only means a test panicked mid-call; the map is still usable
        self.buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn latency(&self) -> Duration {
        self.latency.lock().map(|d| *d).unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store marked unavailable".into()));
        }
        Ok(())
    }

    /// Consumes one injected failure from `counter` if any remain
    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn transfer_window(&self) -> InFlight<'_> {
        let guard = InFlight::enter(self);
        let latency = self.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        guard
    }
}

/// Tracks one running transfer for the peak-concurrency gauge
struct InFlight<'a>(&'a MemoryObjectStore);

impl<'a> InFlight<'a> {
    fn enter(store: &'a MemoryObjectStore) -> Self {
        let now = store.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        store.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(store)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl IObjectStore for MemoryObjectStore {
    fn provider_name(&self) -> &'static str {
        "memory"
    }

    async fn list(&self, bucket: &BucketName) -> Result<Vec<String>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.list_latency.lock().map(|d| *d).unwrap_or_default();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.check_available()?;

        self.lock_buckets()
            .get(bucket.as_str())
            .map(|b| b.keys().cloned().collect())
            .ok_or_else(|| StoreError::BucketNotFound(bucket.to_string()))
    }

    async fn get(&self, bucket: &BucketName, key: &str) -> Result<RemoteObject, StoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let _window = self.transfer_window().await;
        self.check_available()?;
        if Self::take_failure(&self.failing_gets) {
            return Err(StoreError::Unavailable(format!("injected get failure: {key}")));
        }

        let buckets = self.lock_buckets();
        let objects = buckets
            .get(bucket.as_str())
            .ok_or_else(|| StoreError::BucketNotFound(bucket.to_string()))?;
        objects.get(key).cloned().ok_or_else(|| StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    async fn put(&self, bucket: &BucketName, key: &str, data: &[u8]) -> Result<(), StoreError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let _window = self.transfer_window().await;
        self.check_available()?;
        if Self::take_failure(&self.failing_puts) {
            return Err(StoreError::Unavailable(format!("injected put failure: {key}")));
        }

        let mut buckets = self.lock_buckets();
        let objects = buckets
            .get_mut(bucket.as_str())
            .ok_or_else(|| StoreError::BucketNotFound(bucket.to_string()))?;
        objects.insert(
            key.to_string(),
            RemoteObject {
                data: data.to_vec(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }
}
