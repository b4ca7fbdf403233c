//! The generic ordered key-value store contract the core consumes.
//!
//! The core never assumes a concrete backend: callers plug in whatever
//! ordered store they have (RocksDB, a managed KV service, ...). This module
//! defines the trait, an in-memory implementation used by tests and the
//! bundled demo, and a read-through caching decorator grounded in the
//! reference implementation's `injector.NewRWCache` wrapper.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::Result;

/// One row scanned out of the store.
pub type ScanItem = (Vec<u8>, Vec<u8>);

/// The ordered key-value store contract. All operations are async so that a
/// real backend can suspend on I/O; callers are expected to wrap each call in
/// a deadline (see [`crate::config::Config::kv_deadline`]).
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Scans `[start, end)` in ascending key order, yielding at most `limit` rows.
    async fn scan(&self, start: &[u8], end: &[u8], limit: usize) -> Result<Vec<ScanItem>>;

    /// Buffers a put; visible to `get`/`scan` on this handle immediately, but
    /// not durable until the next [`KvStore::flush_puts`].
    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()>;

    /// Buffers point deletes.
    async fn batch_delete(&self, keys: Vec<Vec<u8>>) -> Result<()>;

    /// Atomically commits every buffered put and delete since the previous flush.
    async fn flush_puts(&self) -> Result<()>;
}

/// Wraps a fallible KV operation with a bounded deadline, surfacing a timeout
/// as [`crate::Error::KvTimeout`]. Every suspension point in the ingest path
/// goes through this helper.
pub async fn with_deadline<T>(
    deadline: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_elapsed) => Err(crate::Error::KvTimeout(deadline)),
    }
}

/// A simple in-memory ordered store, backed by a `BTreeMap` for its natural
/// lexicographic ordering. Used by tests and the bundled demo; production
/// deployments plug in a real backend such as the RocksDB one in the
/// `accounthist-rocks` satellite crate.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    committed: BTreeMap<Vec<u8>, Vec<u8>>,
    pending_puts: BTreeMap<Vec<u8>, Vec<u8>>,
    pending_deletes: Vec<Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of durably-committed rows, for assertions in tests.
    pub fn committed_snapshot(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        self.inner.lock().unwrap().committed.clone()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.lock().unwrap();
        if inner.pending_deletes.iter().any(|k| k == key) {
            return Ok(None);
        }
        if let Some(value) = inner.pending_puts.get(key) {
            return Ok(Some(value.clone()));
        }
        Ok(inner.committed.get(key).cloned())
    }

    async fn scan(&self, start: &[u8], end: &[u8], limit: usize) -> Result<Vec<ScanItem>> {
        let inner = self.inner.lock().unwrap();
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = inner
            .committed
            .range(start.to_vec()..end.to_vec())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (k, v) in inner.pending_puts.range(start.to_vec()..end.to_vec()) {
            merged.insert(k.clone(), v.clone());
        }
        for k in &inner.pending_deletes {
            if k.as_slice() >= start && k.as_slice() < end {
                merged.remove(k);
            }
        }
        Ok(merged.into_iter().take(limit).collect())
    }

    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.pending_deletes.retain(|k| k != &key);
        inner.pending_puts.insert(key, value);
        Ok(())
    }

    async fn batch_delete(&self, keys: Vec<Vec<u8>>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for key in keys {
            inner.pending_puts.remove(&key);
            inner.pending_deletes.push(key);
        }
        Ok(())
    }

    async fn flush_puts(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let puts = std::mem::take(&mut inner.pending_puts);
        let deletes = std::mem::take(&mut inner.pending_deletes);
        for (k, v) in puts {
            inner.committed.insert(k, v);
        }
        for k in deletes {
            inner.committed.remove(&k);
        }
        Ok(())
    }
}

/// Decorates any [`KvStore`] with an in-memory read cache of recently-seen
/// keys, cutting redundant round trips to the backend within one shard run.
/// Grounded in the reference implementation's `injector.NewRWCache`, which
/// wraps the raw KV handle the same way before it ever reaches the service.
pub struct CachingKvStore<S> {
    inner: S,
    reads: Mutex<HashMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl<S: KvStore> CachingKvStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            reads: Mutex::new(HashMap::new()),
        }
    }

    fn invalidate(&self, key: &[u8]) {
        self.reads.lock().unwrap().remove(key);
    }
}

#[async_trait]
impl<S: KvStore> KvStore for CachingKvStore<S> {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(cached) = self.reads.lock().unwrap().get(key) {
            return Ok(cached.clone());
        }
        let value = self.inner.get(key).await?;
        self.reads
            .lock()
            .unwrap()
            .insert(key.to_vec(), value.clone());
        Ok(value)
    }

    async fn scan(&self, start: &[u8], end: &[u8], limit: usize) -> Result<Vec<ScanItem>> {
        // Scans are not cached: they're already bounded to one row by every
        // caller in this crate, and caching a range would require tracking
        // invalidation for every key in it.
        self.inner.scan(start, end, limit).await
    }

    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.invalidate(&key);
        self.inner.put(key, value).await
    }

    async fn batch_delete(&self, keys: Vec<Vec<u8>>) -> Result<()> {
        for key in &keys {
            self.invalidate(key);
        }
        self.inner.batch_delete(keys).await
    }

    async fn flush_puts(&self) -> Result<()> {
        self.inner.flush_puts().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_is_visible_before_flush_and_durable_after() {
        let store = MemoryStore::new();
        store.put(b"k".to_vec(), b"v".to_vec()).await.unwrap();
        assert_eq!(store.get(b"k").await.unwrap(), Some(b"v".to_vec()));
        assert!(store.committed_snapshot().is_empty());

        store.flush_puts().await.unwrap();
        assert_eq!(store.committed_snapshot().get(b"k".as_slice()), Some(&b"v".to_vec()));
    }

    #[tokio::test]
    async fn delete_hides_a_pending_put() {
        let store = MemoryStore::new();
        store.put(b"k".to_vec(), b"v".to_vec()).await.unwrap();
        store.batch_delete(vec![b"k".to_vec()]).await.unwrap();
        assert_eq!(store.get(b"k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn scan_respects_bounds_and_limit() {
        let store = MemoryStore::new();
        for i in 0u8..5 {
            store.put(vec![i], vec![i]).await.unwrap();
        }
        store.flush_puts().await.unwrap();

        let rows = store.scan(&[1], &[4], 10).await.unwrap();
        assert_eq!(rows, vec![(vec![1], vec![1]), (vec![2], vec![2]), (vec![3], vec![3])]);

        let limited = store.scan(&[0], &[5], 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn caching_wrapper_serves_repeat_reads_without_another_backend_hit() {
        struct CountingStore {
            inner: MemoryStore,
            gets: std::sync::atomic::AtomicUsize,
        }

        #[async_trait]
        impl KvStore for CountingStore {
            async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
                self.gets.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                self.inner.get(key).await
            }
            async fn scan(&self, s: &[u8], e: &[u8], l: usize) -> Result<Vec<ScanItem>> {
                self.inner.scan(s, e, l).await
            }
            async fn put(&self, k: Vec<u8>, v: Vec<u8>) -> Result<()> {
                self.inner.put(k, v).await
            }
            async fn batch_delete(&self, k: Vec<Vec<u8>>) -> Result<()> {
                self.inner.batch_delete(k).await
            }
            async fn flush_puts(&self) -> Result<()> {
                self.inner.flush_puts().await
            }
        }

        let counting = CountingStore {
            inner: MemoryStore::new(),
            gets: std::sync::atomic::AtomicUsize::new(0),
        };
        counting.put(b"k".to_vec(), b"v".to_vec()).await.unwrap();
        counting.flush_puts().await.unwrap();

        let cached = CachingKvStore::new(counting);
        assert_eq!(cached.get(b"k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(cached.get(b"k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(cached.inner.gets.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn with_deadline_surfaces_timeout() {
        let result: Result<()> = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(crate::Error::KvTimeout(_))));
    }
}
