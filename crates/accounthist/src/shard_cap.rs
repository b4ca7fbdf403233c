//! Computes how many more entries a shard may write for a given account, by
//! scanning the already-finalized higher-priority (lower-numbered) shards.
//! This is the only place correctness crosses a shard boundary, and it does
//! so with a single bounded one-shot scan rather than any cross-shard
//! coordination at write time.

use std::time::Duration;

use crate::key;
use crate::kv::{with_deadline, KvStore};
use crate::error::Result;

/// The reference implementation caps this scan at 5 iterations regardless of
/// `shard`, bounding worst-case resolver latency.
const MAX_ITERATIONS: u8 = 5;

/// Resolves `effective_cap` for `account` in `shard`, given the shard-wide
/// `max_entries_per_account` budget.
///
/// This approximates each higher-priority shard's live row count by its
/// highest ordinal, which overestimates when that shard has itself performed
/// deletions (its true live count is `top_ordinal - last_deleted_ordinal`).
/// That over-estimation is preserved intentionally: it is a known property of
/// the reference algorithm (SPEC_FULL.md §4.3, §9), not a bug introduced here.
pub async fn resolve_effective_cap(
    kv: &dyn KvStore,
    kv_deadline: Duration,
    account: u64,
    shard: u8,
    max_entries_per_account: u64,
) -> Result<u64> {
    let mut next_shard: u8 = 0;
    let mut seen: u64 = 0;

    for _ in 0..MAX_ITERATIONS {
        if next_shard >= shard {
            break;
        }

        // This crate's `KvStore::scan` is ascending-only, so the top ordinal
        // of `next_shard` is found by scanning that shard's own range in full
        // and taking its last (highest-ordinal) row, rather than seeking
        // directly to it with a single reverse lookup.
        let start = key::encode_action_key(account, next_shard, 0);
        let end = key::encode_action_key(account, next_shard + 1, 0);

        let rows =
            with_deadline(kv_deadline, async { kv.scan(&start, &end, usize::MAX).await }).await?;
        let Some((found_key, _value)) = rows.last() else {
            // No data in `next_shard`; shards fill in order, so none of the
            // remaining higher-numbered shards have data either.
            break;
        };

        let (_found_shard, found_ordinal) = key::decode_action_key_shard_ordinal(found_key)?;
        seen = seen.saturating_add(found_ordinal);

        if seen >= max_entries_per_account {
            return Ok(0);
        }

        next_shard += 1;
    }

    Ok(max_entries_per_account.saturating_sub(seen))
}
