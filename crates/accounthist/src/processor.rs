//! The Block Processor: ties the Sequence Cache, Window Maintainer, Key Codec
//! and Flush Controller together into the per-block ingest loop.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::action;
use crate::block::{BlockEvent, BlockFilter};
use crate::checkpoint::{self, ShardCheckpoint};
use crate::config::Config;
use crate::error::Result;
use crate::flush::{FlushController, FlushReason};
use crate::key;
use crate::kv::{with_deadline, KvStore};
use crate::metrics::Metrics;
use crate::sequence::SequenceCache;
use crate::window;

/// How often (in blocks) a throughput summary is logged. Grounded in the
/// `(blk.Number % 1000) == 0` check in `process_block.go`.
const SUMMARY_INTERVAL_BLOCKS: u64 = 1000;

/// Outcome of processing one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    /// `stop_block_num` was reached; the caller should stop pulling from the
    /// block stream after this.
    Stopped,
}

pub struct ShardEngine {
    shard: u8,
    config: Config,
    kv: Arc<dyn KvStore>,
    metrics: Arc<Metrics>,
    sequence_cache: SequenceCache,
    flush: FlushController,
    blocks_since_summary: u64,
}

impl ShardEngine {
    pub fn new(config: Config, kv: Arc<dyn KvStore>, metrics: Arc<Metrics>) -> Self {
        let shard = config.shard_num;
        let sequence_cache = SequenceCache::new(shard, config.max_entries_per_account);
        let flush = FlushController::new(config.flush_blocks_interval, config.realtime_flush_window);
        ShardEngine {
            shard,
            config,
            kv,
            metrics,
            sequence_cache,
            flush,
            blocks_since_summary: 0,
        }
    }

    pub async fn process_block(
        &mut self,
        event: BlockEvent,
        filter: &dyn BlockFilter,
    ) -> Result<Outcome> {
        let BlockEvent {
            block,
            fork_step,
            raw_traces,
        } = event;

        let stop_reached =
            self.config.stop_block_num != 0 && block.num >= self.config.stop_block_num;
        if stop_reached {
            info!(
                shard = self.shard,
                block_num = block.num,
                "stop block reached, flushing and terminating"
            );
            // Written before the flush (rather than after, as the literal step
            // order reads) so the checkpoint lands in the same batch it's
            // flushed with; writing it after an already-issued flush would
            // leave it unflushed. The Go reference skips this write entirely;
            // the checkpoint is persisted here so a restart resumes cleanly
            // from the stop block instead of from whatever was last flushed.
            let checkpoint = ShardCheckpoint {
                last_written_block_num: block.num,
                last_written_block_id: block.id.clone(),
            };
            with_deadline(self.config.kv_deadline, async {
                self.kv
                    .put(
                        key::encode_checkpoint_key(self.shard),
                        checkpoint::encode_checkpoint(&checkpoint),
                    )
                    .await
            })
            .await?;
            with_deadline(self.config.kv_deadline, async { self.kv.flush_puts().await }).await?;
            return Ok(Outcome::Stopped);
        }

        for trx in &block.transaction_traces {
            if trx.reverted {
                continue;
            }

            for act in &trx.action_traces {
                let Some(receipt) = act.receipt.as_ref() else {
                    continue;
                };
                if !filter.matches(&block, act.execution_index) {
                    continue;
                }

                for account in act.accounts() {
                    let mut seq_data = self
                        .sequence_cache
                        .get(&*self.kv, self.config.kv_deadline, &self.metrics, account)
                        .await?;

                    if seq_data.effective_cap == 0 {
                        continue;
                    }
                    if receipt.global_seq <= seq_data.last_global_seq {
                        debug!(shard = self.shard, account, "action already ingested, skipping");
                        continue;
                    }

                    let trim = window::trim(account, self.shard, &seq_data);
                    if !trim.delete_keys.is_empty() {
                        let deleted = trim.delete_keys.len() as u64;
                        let delete_keys = trim.delete_keys;
                        with_deadline(self.config.kv_deadline, async {
                            self.kv.batch_delete(delete_keys).await
                        })
                        .await?;
                        self.metrics.record_actions_deleted(deleted);
                    }
                    seq_data.last_deleted_ordinal = trim.last_deleted_ordinal;

                    let raw_trace = raw_traces.get(&receipt.global_seq).cloned().unwrap_or_default();
                    let row = action::encode_row(
                        &raw_trace,
                        receipt.global_seq,
                        seq_data.last_deleted_ordinal,
                    );
                    let row_key = key::encode_action_key(account, self.shard, seq_data.next_ordinal);
                    with_deadline(self.config.kv_deadline, async { self.kv.put(row_key, row).await })
                        .await?;
                    self.metrics.record_action_written();

                    seq_data.next_ordinal += 1;
                    seq_data.last_global_seq = receipt.global_seq;

                    self.sequence_cache.update(account, seq_data);
                }
            }
        }

        let checkpoint = ShardCheckpoint {
            last_written_block_num: block.num,
            last_written_block_id: block.id.clone(),
        };
        with_deadline(self.config.kv_deadline, async {
            self.kv
                .put(
                    key::encode_checkpoint_key(self.shard),
                    checkpoint::encode_checkpoint(&checkpoint),
                )
                .await
        })
        .await?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        let reason = self.flush.decide(
            block.num,
            fork_step.is_last_in_streak(),
            block.timestamp_unix_secs,
            now,
            false,
        );
        if reason.is_some() {
            with_deadline(self.config.kv_deadline, async { self.kv.flush_puts().await }).await?;
        }
        self.flush.record_block();
        self.metrics.record_block_processed();

        self.blocks_since_summary += 1;
        if self.blocks_since_summary >= SUMMARY_INTERVAL_BLOCKS {
            self.metrics.set_cache_entries(self.sequence_cache.len());
            self.metrics.set_blocks_per_second(self.flush.blocks_per_second());
            info!(
                shard = self.shard,
                block_num = block.num,
                block_id = %block.id,
                blocks_per_second = self.flush.blocks_per_second(),
                cache_size = self.sequence_cache.len(),
                flush_reason = ?reason,
                "throughput summary"
            );
            self.blocks_since_summary = 0;
        }

        Ok(Outcome::Continue)
    }

    /// Commits whatever is currently buffered, regardless of flush policy.
    /// Used on stream exhaustion and on graceful shutdown.
    pub async fn force_flush(&self) -> Result<()> {
        with_deadline(self.config.kv_deadline, async { self.kv.flush_puts().await }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{ActionTrace, Authorization, Block, ForkStep, Receipt, TransactionTrace};
    use crate::kv::MemoryStore;
    use std::collections::HashMap;

    struct AllowAll;
    impl BlockFilter for AllowAll {
        fn matches(&self, _block: &Block, _execution_index: u32) -> bool {
            true
        }
    }

    fn config() -> Config {
        Config {
            shard_num: 0,
            max_entries_per_account: 3,
            flush_blocks_interval: 1000,
            start_block_num: 0,
            stop_block_num: 0,
            ignore_checkpoint_on_launch: false,
            kv_deadline: Duration::from_secs(60),
            realtime_flush_window: Duration::from_secs(20 * 60),
        }
    }

    fn block_with_one_action(num: u64, account: u64, global_seq: u64) -> BlockEvent {
        let mut raw_traces = HashMap::new();
        raw_traces.insert(global_seq, b"trace".to_vec());
        BlockEvent {
            block: Block {
                num,
                id: format!("block-{num}"),
                timestamp_unix_secs: 0,
                transaction_traces: vec![TransactionTrace {
                    reverted: false,
                    action_traces: vec![ActionTrace {
                        execution_index: 0,
                        receiver: account,
                        authorization: vec![Authorization { actor: account }],
                        receipt: Some(Receipt { global_seq }),
                    }],
                }],
            },
            fork_step: ForkStep { step_index: 0, step_count: 1 },
            raw_traces,
        }
    }

    #[tokio::test]
    async fn sliding_window_scenario_keeps_only_the_most_recent_cap_entries() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let metrics = Arc::new(Metrics::new_for_test());
        let mut engine = ShardEngine::new(config(), kv.clone(), metrics);
        let filter = AllowAll;

        for (num, global_seq) in [(1, 10), (2, 20), (3, 30), (4, 40), (5, 50)] {
            let outcome = engine
                .process_block(block_with_one_action(num, 42, global_seq), &filter)
                .await
                .unwrap();
            assert_eq!(outcome, Outcome::Continue);
        }
        kv.flush_puts().await.unwrap();

        let rows = kv
            .scan(&key::encode_action_key(42, 0, 0), &key::account_upper_bound(42), usize::MAX)
            .await
            .unwrap();
        let ordinals: Vec<u64> = rows
            .iter()
            .map(|(k, _)| key::decode_action_key(k).unwrap().2)
            .collect();
        assert_eq!(ordinals, vec![3, 4, 5]);

        let global_seqs: Vec<u64> = rows
            .iter()
            .map(|(_, v)| action::decode_row(v).unwrap().global_seq)
            .collect();
        assert_eq!(global_seqs, vec![30, 40, 50]);
    }

    #[tokio::test]
    async fn receiver_and_authorizer_in_one_action_writes_exactly_one_row_each() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let metrics = Arc::new(Metrics::new_for_test());
        let mut engine = ShardEngine::new(config(), kv.clone(), metrics);
        let filter = AllowAll;

        let mut raw_traces = HashMap::new();
        raw_traces.insert(100, b"trace".to_vec());
        let event = BlockEvent {
            block: Block {
                num: 1,
                id: "block-1".to_string(),
                timestamp_unix_secs: 0,
                transaction_traces: vec![TransactionTrace {
                    reverted: false,
                    action_traces: vec![ActionTrace {
                        execution_index: 0,
                        receiver: 1,
                        authorization: vec![Authorization { actor: 2 }],
                        receipt: Some(Receipt { global_seq: 100 }),
                    }],
                }],
            },
            fork_step: ForkStep { step_index: 0, step_count: 1 },
            raw_traces,
        };
        engine.process_block(event, &filter).await.unwrap();
        kv.flush_puts().await.unwrap();

        for account in [1u64, 2u64] {
            let rows = kv
                .scan(
                    &key::encode_action_key(account, 0, 0),
                    &key::account_upper_bound(account),
                    usize::MAX,
                )
                .await
                .unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(action::decode_row(&rows[0].1).unwrap().global_seq, 100);
        }
    }

    #[tokio::test]
    async fn reverted_transaction_is_fully_skipped() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let metrics = Arc::new(Metrics::new_for_test());
        let mut engine = ShardEngine::new(config(), kv.clone(), metrics);
        let filter = AllowAll;

        let mut raw_traces = HashMap::new();
        raw_traces.insert(100, b"trace".to_vec());
        let event = BlockEvent {
            block: Block {
                num: 1,
                id: "block-1".to_string(),
                timestamp_unix_secs: 0,
                transaction_traces: vec![TransactionTrace {
                    reverted: true,
                    action_traces: vec![ActionTrace {
                        execution_index: 0,
                        receiver: 1,
                        authorization: vec![],
                        receipt: Some(Receipt { global_seq: 100 }),
                    }],
                }],
            },
            fork_step: ForkStep { step_index: 0, step_count: 1 },
            raw_traces,
        };
        engine.process_block(event, &filter).await.unwrap();
        kv.flush_puts().await.unwrap();

        let rows = kv
            .scan(&key::encode_action_key(1, 0, 0), &key::account_upper_bound(1), usize::MAX)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn replaying_already_ingested_actions_mutates_nothing() {
        let mem = Arc::new(MemoryStore::new());
        let kv: Arc<dyn KvStore> = mem.clone();
        let metrics = Arc::new(Metrics::new_for_test());
        let mut engine = ShardEngine::new(config(), kv.clone(), metrics);
        let filter = AllowAll;

        engine
            .process_block(block_with_one_action(1, 42, 10), &filter)
            .await
            .unwrap();
        kv.flush_puts().await.unwrap();
        let before = mem.committed_snapshot();

        // Redelivering the exact same block: the action is already ingested,
        // and the checkpoint is rewritten with the identical value.
        engine
            .process_block(block_with_one_action(1, 42, 10), &filter)
            .await
            .unwrap();
        kv.flush_puts().await.unwrap();
        let after = mem.committed_snapshot();

        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn stop_block_reached_flushes_and_signals_stop() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let metrics = Arc::new(Metrics::new_for_test());
        let mut cfg = config();
        cfg.stop_block_num = 5;
        let mut engine = ShardEngine::new(cfg, kv.clone(), metrics);
        let filter = AllowAll;

        let outcome = engine
            .process_block(block_with_one_action(5, 42, 10), &filter)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Stopped);
    }
}
