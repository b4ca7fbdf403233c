//! Source setup: reads the shard checkpoint and derives the block the ingest
//! loop should resume from. Wrapping the raw chain data source in a
//! fork-resolver that yields [`crate::block::BlockStream`] items is external
//! to this crate.

use std::sync::Arc;

use tracing::info;

use crate::checkpoint::{self, ShardCheckpoint};
use crate::config::Config;
use crate::error::Result;
use crate::key;
use crate::kv::{with_deadline, KvStore};

/// Reads the persisted checkpoint for `config.shard_num`, honoring
/// `ignore_checkpoint_on_launch`.
pub async fn read_checkpoint(
    kv: &dyn KvStore,
    config: &Config,
) -> Result<Option<ShardCheckpoint>> {
    if config.ignore_checkpoint_on_launch {
        return Ok(None);
    }

    let key = key::encode_checkpoint_key(config.shard_num);
    let value = with_deadline(config.kv_deadline, async { kv.get(&key).await }).await?;
    value.map(|bytes| checkpoint::decode_checkpoint(&bytes)).transpose()
}

/// The block number the ingest loop should start pulling from: either right
/// after the last checkpointed block, or the configured start block if there
/// is no usable checkpoint.
pub fn resume_block_num(config: &Config, checkpoint: Option<&ShardCheckpoint>) -> u64 {
    match checkpoint {
        Some(cp) => cp.last_written_block_num + 1,
        None => config.start_block_num,
    }
}

/// Convenience wrapping both steps together, as the demo binary and any real
/// connector would call them.
pub async fn resolve_start_block(kv: Arc<dyn KvStore>, config: &Config) -> Result<u64> {
    let checkpoint = read_checkpoint(&*kv, config).await?;
    let start = resume_block_num(config, checkpoint.as_ref());
    info!(
        shard = config.shard_num,
        start_block_num = start,
        resumed_from_checkpoint = checkpoint.is_some(),
        "resolved start block"
    );
    Ok(start)
}
