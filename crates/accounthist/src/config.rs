//! Configuration consumed by the core. Sourcing it (files, env, flags) is the
//! ambient CLI layer's job; the core only ever sees an already-built `Config`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 0 is the live tail; higher numbers hold strictly older block ranges.
    pub shard_num: u8,
    /// Sliding-window cap per account, before any cross-shard adjustment.
    pub max_entries_per_account: u64,
    /// Blocks between boundary (non-realtime) flushes.
    pub flush_blocks_interval: u64,
    /// First block to ingest, absent a checkpoint.
    pub start_block_num: u64,
    /// Last block to ingest; 0 means unbounded.
    #[serde(default)]
    pub stop_block_num: u64,
    /// Ignore any persisted checkpoint and start fresh from `start_block_num`.
    #[serde(default)]
    pub ignore_checkpoint_on_launch: bool,
    /// Bound on every KV suspension point (get/scan/put/batch_delete/flush_puts).
    #[serde(with = "humantime_serde", default = "default_kv_deadline")]
    pub kv_deadline: Duration,
    /// How close to wall-clock a block's timestamp must be for a terminal
    /// fork-streak step to force a flush.
    #[serde(with = "humantime_serde", default = "default_realtime_flush_window")]
    pub realtime_flush_window: Duration,
}

fn default_kv_deadline() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_realtime_flush_window() -> Duration {
    Duration::from_secs(20 * 60)
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.max_entries_per_account == 0 {
            return Err(Error::Config(
                "max_entries_per_account must be at least 1".to_string(),
            ));
        }
        if self.flush_blocks_interval == 0 {
            return Err(Error::Config(
                "flush_blocks_interval must be at least 1".to_string(),
            ));
        }
        if self.stop_block_num != 0 && self.stop_block_num < self.start_block_num {
            return Err(Error::Config(format!(
                "stop_block_num ({}) is before start_block_num ({})",
                self.stop_block_num, self.start_block_num
            )));
        }
        Ok(())
    }
}
