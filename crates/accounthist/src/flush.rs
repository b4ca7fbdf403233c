//! Batches KV mutations and decides when to commit them.
//!
//! Buffered puts and deletes live in the KV store's own pending batch (see
//! [`crate::kv::KvStore`]); this module only decides *when* to call
//! `flush_puts`, and tracks the rolling blocks-per-second figure used in the
//! throughput summary (grounded in `lastWrittenBlock` / the batch-metrics log
//! line in `process_block.go`).

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// `block.num % flush_blocks_interval == 0`.
    Boundary,
    /// Terminal fork-streak step delivered close enough to wall-clock.
    Realtime,
    /// `stop_block_num` has been reached.
    Stop,
}

pub struct FlushController {
    flush_blocks_interval: u64,
    realtime_flush_window: Duration,
    window_start: Instant,
    blocks_since_window_start: u64,
    current_rate: f64,
}

impl FlushController {
    pub fn new(flush_blocks_interval: u64, realtime_flush_window: Duration) -> Self {
        FlushController {
            flush_blocks_interval,
            realtime_flush_window,
            window_start: Instant::now(),
            blocks_since_window_start: 0,
            current_rate: 0.0,
        }
    }

    /// Decides whether the current block should trigger a flush, and why.
    /// `now` and `block_timestamp` are both Unix seconds so the realtime
    /// check never depends on wall-clock access beyond what the caller
    /// already has to hand.
    pub fn decide(
        &self,
        block_num: u64,
        is_last_in_streak: bool,
        block_timestamp_unix_secs: u64,
        now_unix_secs: u64,
        stop_reached: bool,
    ) -> Option<FlushReason> {
        if stop_reached {
            return Some(FlushReason::Stop);
        }
        if self.flush_blocks_interval != 0 && block_num % self.flush_blocks_interval == 0 {
            return Some(FlushReason::Boundary);
        }
        if is_last_in_streak {
            let age = now_unix_secs.saturating_sub(block_timestamp_unix_secs);
            if Duration::from_secs(age) < self.realtime_flush_window {
                return Some(FlushReason::Realtime);
            }
        }
        None
    }

    /// Folds one processed block into the rolling rate. Call once per block,
    /// regardless of whether that block triggered a flush.
    pub fn record_block(&mut self) {
        self.blocks_since_window_start += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            self.current_rate = self.blocks_since_window_start as f64 / elapsed.as_secs_f64();
            self.window_start = Instant::now();
            self.blocks_since_window_start = 0;
        }
    }

    pub fn blocks_per_second(&self) -> f64 {
        self.current_rate
    }
}
