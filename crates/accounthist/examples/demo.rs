//! Synthetic end-to-end demo: generates a random block stream, runs it
//! through a single shard's [`ShardEngine`] over an in-memory store, and
//! prints the resulting per-account row counts.
//!
//! ```text
//! cargo run --example demo -- --blocks 5000 --accounts 50 --cap 10
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use accounthist::block::{
    ActionTrace, Authorization, Block, BlockEvent, BlockFilter, BlockStream, ForkStep, Receipt,
    TransactionTrace,
};
use accounthist::config::Config;
use accounthist::key;
use accounthist::kv::{KvStore, MemoryStore};
use accounthist::metrics::Metrics;
use accounthist::processor::ShardEngine;
use accounthist::run::run_shard;
use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use rand::Rng;
use tokio_util::sync::CancellationToken;

#[derive(Debug, clap::Parser)]
#[command(about = "Replays a synthetic block stream through accounthist's shard engine")]
struct Args {
    /// Number of blocks to generate.
    #[arg(long, default_value_t = 2_000)]
    blocks: u64,

    /// Number of distinct accounts actions are randomly routed to.
    #[arg(long, default_value_t = 25)]
    accounts: u64,

    /// Sliding-window cap per account.
    #[arg(long, default_value_t = 10)]
    cap: u64,

    /// Blocks between boundary flushes.
    #[arg(long, default_value_t = 200)]
    flush_interval: u64,

    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Generates an unbounded stream of single-action blocks, each routing its
/// action to a uniformly random account, with a strictly increasing
/// `global_seq`.
struct SyntheticStream {
    rng: rand::rngs::SmallRng,
    accounts: u64,
    next_block_num: u64,
    next_global_seq: u64,
    remaining: u64,
}

#[async_trait]
impl BlockStream for SyntheticStream {
    async fn next(&mut self) -> accounthist::Result<Option<BlockEvent>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;

        let account = self.rng.gen_range(0..self.accounts);
        let global_seq = self.next_global_seq;
        self.next_global_seq += 1;

        let block_num = self.next_block_num;
        self.next_block_num += 1;

        let mut raw_traces = HashMap::new();
        raw_traces.insert(global_seq, format!("trace-{global_seq}").into_bytes());

        Ok(Some(BlockEvent {
            block: Block {
                num: block_num,
                id: format!("block-{block_num}"),
                timestamp_unix_secs: block_num,
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
        }))
    }
}

struct AllowAll;
impl BlockFilter for AllowAll {
    fn matches(&self, _block: &Block, _execution_index: u32) -> bool {
        true
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&args.log_level))
        .init();

    let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let config = Config {
        shard_num: 0,
        max_entries_per_account: args.cap,
        flush_blocks_interval: args.flush_interval,
        start_block_num: 0,
        stop_block_num: 0,
        ignore_checkpoint_on_launch: true,
        kv_deadline: Duration::from_secs(30),
        realtime_flush_window: Duration::from_secs(5),
    };
    config.validate()?;

    let mut engine = ShardEngine::new(config, kv.clone(), Arc::new(Metrics::new(0)));
    let mut stream = SyntheticStream {
        rng: rand::SeedableRng::seed_from_u64(42),
        accounts: args.accounts,
        next_block_num: 1,
        next_global_seq: 1,
        remaining: args.blocks,
    };
    let filter = AllowAll;

    run_shard(&mut engine, &mut stream, &filter, CancellationToken::new()).await?;

    for account in 0..args.accounts {
        let start = key::encode_action_key(account, 0, 0);
        let end = key::account_upper_bound(account);
        let rows = kv.scan(&start, &end, usize::MAX).await?;
        println!("account {account:>4}: {} live rows", rows.len());
    }

    Ok(())
}
