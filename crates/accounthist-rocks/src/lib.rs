//! RocksDB-backed [`accounthist::kv::KvStore`].
//!
//! RocksDB's API is synchronous; every call here runs on a blocking-pool
//! thread via [`tokio::task::spawn_blocking`] so the core's async ingest loop
//! never stalls waiting on disk I/O. Buffering of puts/deletes ahead of
//! [`KvStore::flush_puts`] is grounded in the reference implementation's
//! `Registers` cache-then-`WriteBatch` pattern (`derive::registers`):
//! writes accumulate in memory and are visible to reads on this handle
//! immediately, but only committed to the database as one atomic
//! `WriteBatch` on flush.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rocksdb::{IteratorMode, Options, WriteBatch, DB};

use accounthist::error::{Error, Result};
use accounthist::kv::{KvStore, ScanItem};

/// A single-column-family RocksDB store. The keyspace is already
/// self-partitioning (action rows and checkpoints sort into disjoint ranges
/// under their own key prefix), so no column families beyond the default one
/// are needed.
pub struct RocksStore {
    db: Arc<DB>,
    pending: Mutex<Pending>,
}

#[derive(Default)]
struct Pending {
    puts: BTreeMap<Vec<u8>, Vec<u8>>,
    deletes: Vec<Vec<u8>>,
}

impl RocksStore {
    /// Opens (creating if absent) a RocksDB database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path).map_err(Error::kv)?;
        Ok(Self {
            db: Arc::new(db),
            pending: Mutex::new(Pending::default()),
        })
    }
}

#[async_trait]
impl KvStore for RocksStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        {
            let pending = self.pending.lock().unwrap();
            if pending.deletes.iter().any(|k| k == key) {
                return Ok(None);
            }
            if let Some(value) = pending.puts.get(key) {
                return Ok(Some(value.clone()));
            }
        }

        let db = self.db.clone();
        let key = key.to_vec();
        tokio::task::spawn_blocking(move || db.get_pinned(&key).map(|v| v.map(|p| p.to_vec())))
            .await
            .expect("rocksdb get task panicked")
            .map_err(Error::kv)
    }

    async fn scan(&self, start: &[u8], end: &[u8], limit: usize) -> Result<Vec<ScanItem>> {
        let db = self.db.clone();
        let start_owned = start.to_vec();
        let end_owned = end.to_vec();
        let committed = tokio::task::spawn_blocking(move || {
            let mut rows = Vec::new();
            let iter = db.iterator(IteratorMode::From(&start_owned, rocksdb::Direction::Forward));
            for item in iter {
                let (k, v) = item?;
                if k.as_ref() >= end_owned.as_slice() {
                    break;
                }
                rows.push((k.to_vec(), v.to_vec()));
            }
            Ok::<_, rocksdb::Error>(rows)
        })
        .await
        .expect("rocksdb scan task panicked")
        .map_err(Error::kv)?;

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = committed.into_iter().collect();
        let pending = self.pending.lock().unwrap();
        for (k, v) in pending.puts.range(start.to_vec()..end.to_vec()) {
            merged.insert(k.clone(), v.clone());
        }
        for k in &pending.deletes {
            if k.as_slice() >= start && k.as_slice() < end {
                merged.remove(k);
            }
        }
        Ok(merged.into_iter().take(limit).collect())
    }

    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        let mut pending = self.pending.lock().unwrap();
        pending.deletes.retain(|k| k != &key);
        pending.puts.insert(key, value);
        Ok(())
    }

    async fn batch_delete(&self, keys: Vec<Vec<u8>>) -> Result<()> {
        let mut pending = self.pending.lock().unwrap();
        for key in keys {
            pending.puts.remove(&key);
            pending.deletes.push(key);
        }
        Ok(())
    }

    async fn flush_puts(&self) -> Result<()> {
        let (puts, deletes) = {
            let mut pending = self.pending.lock().unwrap();
            (
                std::mem::take(&mut pending.puts),
                std::mem::take(&mut pending.deletes),
            )
        };
        if puts.is_empty() && deletes.is_empty() {
            return Ok(());
        }

        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let mut batch = WriteBatch::default();
            for (k, v) in puts {
                batch.put(k, v);
            }
            for k in deletes {
                batch.delete(k);
            }
            db.write(batch)
        })
        .await
        .expect("rocksdb flush task panicked")
        .map_err(Error::kv)
    }
}
