//! Prometheus metrics for one shard's run.
//!
//! A single [`Metrics`] is created per shard process and threaded through the
//! Sequence Cache and Block Processor. Registration failures (duplicate
//! registration in particular) are treated as a programming error, not a
//! runtime condition, so this module panics rather than returning `Result` —
//! mirrored from how the reference registers its counters once at startup.

use prometheus::{Counter, Gauge, Registry};

pub struct Metrics {
    registry: Registry,
    pub blocks_processed_total: Counter,
    pub actions_written_total: Counter,
    pub actions_deleted_total: Counter,
    pub cache_hits_total: Counter,
    pub cache_misses_total: Counter,
    pub cache_entries: Gauge,
    pub blocks_per_second: Gauge,
}

impl Metrics {
    pub fn new(shard: u8) -> Self {
        let registry = Registry::new();

        let blocks_processed_total = Counter::new(
            "accounthist_blocks_processed_total",
            "Blocks processed by this shard.",
        )
        .unwrap();
        let actions_written_total = Counter::new(
            "accounthist_actions_written_total",
            "Action rows written by this shard.",
        )
        .unwrap();
        let actions_deleted_total = Counter::new(
            "accounthist_actions_deleted_total",
            "Action rows deleted by the window maintainer.",
        )
        .unwrap();
        let cache_hits_total = Counter::new(
            "accounthist_sequence_cache_hits_total",
            "Sequence cache hits.",
        )
        .unwrap();
        let cache_misses_total = Counter::new(
            "accounthist_sequence_cache_misses_total",
            "Sequence cache misses.",
        )
        .unwrap();
        let cache_entries = Gauge::new(
            "accounthist_sequence_cache_entries",
            "Accounts currently held in the sequence cache.",
        )
        .unwrap();
        let blocks_per_second = Gauge::new(
            "accounthist_blocks_per_second",
            "Rolling blocks-per-second ingestion rate.",
        )
        .unwrap();

        for metric in [
            Box::new(blocks_processed_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(actions_written_total.clone()),
            Box::new(actions_deleted_total.clone()),
            Box::new(cache_hits_total.clone()),
            Box::new(cache_misses_total.clone()),
            Box::new(cache_entries.clone()),
            Box::new(blocks_per_second.clone()),
        ] {
            registry
                .register(metric)
                .expect("metric names are fixed and unique within a shard");
        }

        tracing::debug!(shard, "metrics registry initialized");

        Metrics {
            registry,
            blocks_processed_total,
            actions_written_total,
            actions_deleted_total,
            cache_hits_total,
            cache_misses_total,
            cache_entries,
            blocks_per_second,
        }
    }

    /// A registry with no shard label, for use in unit and integration tests
    /// that don't care about export wiring.
    pub fn new_for_test() -> Self {
        Metrics::new(0)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits_total.inc();
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses_total.inc();
    }

    pub fn record_block_processed(&self) {
        self.blocks_processed_total.inc();
    }

    pub fn record_action_written(&self) {
        self.actions_written_total.inc();
    }

    pub fn record_actions_deleted(&self, count: u64) {
        self.actions_deleted_total.inc_by(count as f64);
    }

    pub fn set_cache_entries(&self, count: usize) {
        self.cache_entries.set(count as f64);
    }

    pub fn set_blocks_per_second(&self, rate: f64) {
        self.blocks_per_second.set(rate);
    }
}
