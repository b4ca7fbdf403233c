//! Per-account sequence data and the in-memory cache that holds it for the
//! lifetime of one shard's run.

use std::collections::HashMap;

use crate::action;
use crate::error::Result;
use crate::key;
use crate::kv::{with_deadline, KvStore};
use crate::metrics::Metrics;
use crate::shard_cap::resolve_effective_cap;

/// Everything the Block Processor needs to know about one account, within one
/// shard's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceData {
    /// Ordinal to assign to the next write. 1-based; starts at 1.
    pub next_ordinal: u64,
    /// `global_seq` of the most recently written action for this account in
    /// this shard, used to suppress duplicate ingestion after a checkpoint replay.
    pub last_global_seq: u64,
    /// Highest ordinal the Window Maintainer has already deleted. 0 means none.
    pub last_deleted_ordinal: u64,
    /// Remaining entries this shard may still write for this account, after
    /// accounting for what higher-priority shards already hold. Distinct from
    /// (and never conflated with) the shard-wide `max_entries_per_account`
    /// configuration value — see SPEC_FULL.md §9.
    pub effective_cap: u64,
}

impl SequenceData {
    fn fresh(effective_cap: u64) -> Self {
        SequenceData {
            next_ordinal: 1,
            last_global_seq: 0,
            last_deleted_ordinal: 0,
            effective_cap,
        }
    }
}

/// Read-through, write-back cache from account to [`SequenceData`], private to
/// one shard's run. Misses populate themselves from the KV store (the
/// account's own prior rows in this shard) and the Shard-Cap Resolver (prior
/// shards); there is deliberately no eviction — see the Open Questions in
/// SPEC_FULL.md §9.
pub struct SequenceCache {
    shard: u8,
    max_entries_per_account: u64,
    entries: HashMap<u64, SequenceData>,
}

impl SequenceCache {
    pub fn new(shard: u8, max_entries_per_account: u64) -> Self {
        SequenceCache {
            shard,
            max_entries_per_account,
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the cached entry for `account`, populating it on first touch.
    pub async fn get(
        &mut self,
        kv: &dyn KvStore,
        kv_deadline: std::time::Duration,
        metrics: &Metrics,
        account: u64,
    ) -> Result<SequenceData> {
        if let Some(data) = self.entries.get(&account) {
            metrics.record_cache_hit();
            return Ok(*data);
        }
        metrics.record_cache_miss();

        let loaded = self.load(kv, kv_deadline, account).await?;
        self.entries.insert(account, loaded);
        Ok(loaded)
    }

    pub fn update(&mut self, account: u64, data: SequenceData) {
        self.entries.insert(account, data);
    }

    async fn load(
        &self,
        kv: &dyn KvStore,
        kv_deadline: std::time::Duration,
        account: u64,
    ) -> Result<SequenceData> {
        let from_rows = self.read_last_sequence_data(kv, kv_deadline, account).await?;

        let effective_cap = resolve_effective_cap(
            kv,
            kv_deadline,
            account,
            self.shard,
            self.max_entries_per_account,
        )
        .await?;

        Ok(match from_rows {
            Some(mut data) => {
                data.effective_cap = effective_cap;
                data
            }
            None => SequenceData::fresh(effective_cap),
        })
    }

    /// Scans this shard's own prior rows for `account` to recover
    /// `next_ordinal`, `last_global_seq` and `last_deleted_ordinal`. Returns
    /// `None` if the account has never been written in this shard.
    async fn read_last_sequence_data(
        &self,
        kv: &dyn KvStore,
        kv_deadline: std::time::Duration,
        account: u64,
    ) -> Result<Option<SequenceData>> {
        let start = key::encode_action_key(account, self.shard, 0);
        let end = key::encode_action_key(account, self.shard + 1, 0);

        let rows = with_deadline(kv_deadline, async { kv.scan(&start, &end, usize::MAX).await }).await?;
        if rows.is_empty() {
            return Ok(None);
        }

        // Rows sort ascending by ordinal within `(account, shard)`; the last
        // row is the most recently written one.
        let (last_key, last_value) = rows.last().unwrap();
        let (_account, _shard, last_ordinal) = key::decode_action_key(last_key)?;
        let decoded = action::decode_row(last_value)?;

        Ok(Some(SequenceData {
            next_ordinal: last_ordinal + 1,
            last_global_seq: decoded.global_seq,
            last_deleted_ordinal: decoded.last_deleted_ordinal,
            effective_cap: 0, // overwritten by the caller with the resolver's result
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn first_touch_initializes_fresh_sequence_data() {
        let kv = MemoryStore::new();
        let metrics = Metrics::new_for_test();
        let mut cache = SequenceCache::new(0, 10);

        let data = cache.get(&kv, Duration::from_secs(1), &metrics, 42).await.unwrap();
        assert_eq!(data.next_ordinal, 1);
        assert_eq!(data.last_global_seq, 0);
        assert_eq!(data.last_deleted_ordinal, 0);
        assert_eq!(data.effective_cap, 10);
    }

    #[tokio::test]
    async fn second_touch_is_served_from_cache() {
        let kv = MemoryStore::new();
        let metrics = Metrics::new_for_test();
        let mut cache = SequenceCache::new(0, 10);

        cache.get(&kv, Duration::from_secs(1), &metrics, 42).await.unwrap();
        cache.update(42, SequenceData {
            next_ordinal: 5,
            last_global_seq: 99,
            last_deleted_ordinal: 1,
            effective_cap: 10,
        });
        let data = cache.get(&kv, Duration::from_secs(1), &metrics, 42).await.unwrap();
        assert_eq!(data.next_ordinal, 5);
        assert_eq!(data.last_global_seq, 99);
    }

    #[tokio::test]
    async fn restart_recovers_sequence_data_from_rows() {
        let kv = MemoryStore::new();
        let metrics = Metrics::new_for_test();

        let row = action::encode_row(b"trace", 30, 2);
        kv.put(key::encode_action_key(42, 0, 3), row).await.unwrap();
        kv.flush_puts().await.unwrap();

        let mut cache = SequenceCache::new(0, 10);
        let data = cache.get(&kv, Duration::from_secs(1), &metrics, 42).await.unwrap();
        assert_eq!(data.next_ordinal, 4);
        assert_eq!(data.last_global_seq, 30);
        assert_eq!(data.last_deleted_ordinal, 2);
    }
}
