//! Wires the block stream, the [`ShardEngine`], and graceful shutdown into
//! the single-threaded cooperative ingest loop described in SPEC_FULL.md §5.

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::block::{BlockFilter, BlockStream};
use crate::error::Result;
use crate::processor::{Outcome, ShardEngine};

/// Pulls blocks from `stream` and feeds them to `engine` until the stream is
/// exhausted, the engine reports the stop block was reached, or `shutdown` is
/// triggered. On any exit path, pending KV writes are force-flushed before
/// returning — no in-flight KV call is aborted mid-way; callers bound that
/// wait with `Config::kv_deadline`.
pub async fn run_shard(
    engine: &mut ShardEngine,
    stream: &mut dyn BlockStream,
    filter: &dyn BlockFilter,
    shutdown: CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("shutdown requested, finishing current block and flushing");
                engine.force_flush().await?;
                return Ok(());
            }

            next = stream.next() => {
                let Some(event) = next? else {
                    info!("block stream exhausted");
                    engine.force_flush().await?;
                    return Ok(());
                };

                if engine.process_block(event, filter).await? == Outcome::Stopped {
                    return Ok(());
                }
            }
        }
    }
}
