//! Sliding-window trim: decides what to delete for an account given its
//! sequence data, ahead of every write.
//!
//! `last_written` is taken to be the ordinal about to be assigned to the
//! write in progress (`seq_data.next_ordinal`), not the previous write's
//! ordinal: trimming runs once per write and must account for the row that
//! write is about to add, or the live window would lag one entry behind
//! `effective_cap` forever.

use crate::key;
use crate::sequence::SequenceData;

/// Result of running the window maintainer ahead of one write.
pub struct Trim {
    /// Keys to delete, oldest first. Empty when nothing needed trimming.
    pub delete_keys: Vec<Vec<u8>>,
    /// The new `last_deleted_ordinal`, to be written back onto `seq_data`.
    pub last_deleted_ordinal: u64,
}

/// Computes the point deletes needed to keep `account`'s window within
/// `seq_data.effective_cap`, without mutating `seq_data`.
pub fn trim(account: u64, shard: u8, seq_data: &SequenceData) -> Trim {
    let last_written = seq_data.next_ordinal;

    if last_written <= seq_data.effective_cap {
        return Trim {
            delete_keys: Vec::new(),
            last_deleted_ordinal: seq_data.last_deleted_ordinal,
        };
    }

    let least_recent = last_written - seq_data.effective_cap;
    if seq_data.last_deleted_ordinal >= least_recent {
        return Trim {
            delete_keys: Vec::new(),
            last_deleted_ordinal: seq_data.last_deleted_ordinal,
        };
    }

    let delete_keys = (seq_data.last_deleted_ordinal + 1..=least_recent)
        .map(|ordinal| key::encode_action_key(account, shard, ordinal))
        .collect();

    Trim {
        delete_keys,
        last_deleted_ordinal: least_recent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(next_ordinal: u64, last_deleted_ordinal: u64, effective_cap: u64) -> SequenceData {
        SequenceData {
            next_ordinal,
            last_global_seq: 0,
            last_deleted_ordinal,
            effective_cap,
        }
    }

    #[test]
    fn under_cap_trims_nothing() {
        let data = seq(4, 0, 5);
        let trim = trim(1, 0, &data);
        assert!(trim.delete_keys.is_empty());
        assert_eq!(trim.last_deleted_ordinal, 0);
    }

    #[test]
    fn over_cap_deletes_the_oldest_excess() {
        // next_ordinal=6 (this write would be the 6th), cap=3 => least_recent=3.
        let data = seq(6, 0, 3);
        let trim = trim(1, 0, &data);
        assert_eq!(trim.last_deleted_ordinal, 3);
        assert_eq!(
            trim.delete_keys,
            vec![
                key::encode_action_key(1, 0, 1),
                key::encode_action_key(1, 0, 2),
                key::encode_action_key(1, 0, 3),
            ]
        );
    }

    #[test]
    fn already_trimmed_state_is_a_no_op() {
        let data = seq(6, 3, 3);
        let trim = trim(1, 0, &data);
        assert!(trim.delete_keys.is_empty());
        assert_eq!(trim.last_deleted_ordinal, 3);
    }

    #[test]
    fn cap_of_one_deletes_every_prior_entry() {
        // Second write for this account (next_ordinal=2): trims ordinal 1,
        // matching "each new action deletes the previous one".
        let data = seq(2, 0, 1);
        let trim = trim(7, 0, &data);
        assert_eq!(trim.last_deleted_ordinal, 1);
        assert_eq!(trim.delete_keys, vec![key::encode_action_key(7, 0, 1)]);
    }

    #[test]
    fn five_writes_at_cap_three_leaves_the_three_most_recent() {
        // Mirrors the worked example: cap=3, write #4 and #5 each trim one
        // more stale ordinal, ending with {3,4,5} live.
        let mut data = seq(1, 0, 3);
        let mut deleted = Vec::new();
        for next_ordinal in 1..=5u64 {
            data.next_ordinal = next_ordinal;
            let trim = trim(1, 0, &data);
            deleted.extend(trim.delete_keys.iter().map(|k| key::decode_action_key(k).unwrap().2));
            data.last_deleted_ordinal = trim.last_deleted_ordinal;
        }
        assert_eq!(deleted, vec![1, 2]);
        assert_eq!(data.last_deleted_ordinal, 2);
    }
}
