//! External contracts the core consumes: the block stream, its fork metadata,
//! and the action-matching filter. None of these are implemented by this
//! crate — a connector to a concrete chain data source provides them.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

/// Authorization actor on one action trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorization {
    pub actor: u64,
}

/// Receipt attached to a matched, non-reverted action trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub global_seq: u64,
}

/// One executed action within a transaction trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTrace {
    pub execution_index: u32,
    pub receiver: u64,
    pub authorization: Vec<Authorization>,
    /// `None` when the action was matched but carries no receipt — skipped
    /// by the Block Processor without being treated as an error.
    pub receipt: Option<Receipt>,
}

impl ActionTrace {
    /// The account set this action touches: the receiver plus every
    /// authorization actor, deduplicated. Traversal order doesn't matter —
    /// each account's sequence update is independent.
    pub fn accounts(&self) -> Vec<u64> {
        let mut accounts = Vec::with_capacity(1 + self.authorization.len());
        accounts.push(self.receiver);
        for auth in &self.authorization {
            if !accounts.contains(&auth.actor) {
                accounts.push(auth.actor);
            }
        }
        accounts
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionTrace {
    pub reverted: bool,
    pub action_traces: Vec<ActionTrace>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub num: u64,
    pub id: String,
    pub timestamp_unix_secs: u64,
    pub transaction_traces: Vec<TransactionTrace>,
}

/// Opaque upstream trace bytes, keyed by `global_seq`, pre-materialized by
/// the fork resolver alongside each delivered block.
pub type RawTraces = HashMap<u64, Vec<u8>>;

/// Fork-resolution metadata accompanying one delivered block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkStep {
    pub step_index: u32,
    pub step_count: u32,
}

impl ForkStep {
    pub fn is_last_in_streak(&self) -> bool {
        self.step_index + 1 == self.step_count
    }
}

/// One item delivered by the block stream.
pub struct BlockEvent {
    pub block: Block,
    pub fork_step: ForkStep,
    pub raw_traces: RawTraces,
}

/// Per-action match decisions for one block, keyed by `execution_index`.
pub trait BlockFilter: Send + Sync {
    fn matches(&self, block: &Block, execution_index: u32) -> bool;
}

/// A fork-resolved stream of blocks. Implementations own the connection to
/// the upstream chain data source and the fork-resolution logic; the core
/// only ever pulls the next resolved event.
#[async_trait]
pub trait BlockStream: Send {
    async fn next(&mut self) -> Result<Option<BlockEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accounts_dedupes_receiver_against_authorizers() {
        let act = ActionTrace {
            execution_index: 0,
            receiver: 7,
            authorization: vec![Authorization { actor: 7 }, Authorization { actor: 9 }],
            receipt: Some(Receipt { global_seq: 1 }),
        };
        assert_eq!(act.accounts(), vec![7, 9]);
    }

    #[test]
    fn fork_step_detects_last_in_streak() {
        assert!(ForkStep { step_index: 2, step_count: 3 }.is_last_in_streak());
        assert!(!ForkStep { step_index: 1, step_count: 3 }.is_last_in_streak());
    }
}
