//! Bijective encoding of accounthist keys over a single shared, sorted keyspace.
//!
//! Two key families share the space; a one-byte prefix disambiguates them so
//! that action rows and shard checkpoints can never collide, while still
//! sorting into two contiguous ranges.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::error::{Error, Result};

pub const ACTION_PREFIX: u8 = 0x01;
pub const CHECKPOINT_PREFIX: u8 = 0x02;

pub const ACTION_KEY_LEN: usize = 1 + 8 + 1 + 8;
pub const CHECKPOINT_KEY_LEN: usize = 1 + 1;

/// `[prefix:1][account:8BE][shard:1][ordinal:8BE]`
pub fn encode_action_key(account: u64, shard: u8, ordinal: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(ACTION_KEY_LEN);
    key.push(ACTION_PREFIX);
    key.write_u64::<BigEndian>(account).unwrap();
    key.push(shard);
    key.write_u64::<BigEndian>(ordinal).unwrap();
    key
}

/// Recovers `(account, shard, ordinal)` from a key produced by [`encode_action_key`].
pub fn decode_action_key(key: &[u8]) -> Result<(u64, u8, u64)> {
    if key.len() != ACTION_KEY_LEN {
        return Err(Error::ShortKey(key.to_vec()));
    }
    if key[0] != ACTION_PREFIX {
        return Err(Error::UnknownPrefix(key[0]));
    }

    let mut cursor = Cursor::new(&key[1..]);
    let account = cursor
        .read_u64::<BigEndian>()
        .map_err(|e| Error::decode("action key account", key, e))?;
    let shard = cursor
        .read_u8()
        .map_err(|e| Error::decode("action key shard", key, e))?;
    let ordinal = cursor
        .read_u64::<BigEndian>()
        .map_err(|e| Error::decode("action key ordinal", key, e))?;

    Ok((account, shard, ordinal))
}

/// Recovers only `(shard, ordinal)`, for the common case where the account is
/// already known from the scan bounds (mirrors the reference's
/// `decodeActionKeySeqNum`).
pub fn decode_action_key_shard_ordinal(key: &[u8]) -> Result<(u8, u64)> {
    let (_account, shard, ordinal) = decode_action_key(key)?;
    Ok((shard, ordinal))
}

/// Smallest possible action key for `account` — the start of its range.
pub fn action_key_lower_bound(account: u64, shard: u8) -> Vec<u8> {
    encode_action_key(account, shard, 0)
}

/// One-past-the-end key for `account`, usable as a scan's exclusive upper bound
/// across every shard and ordinal belonging to that account.
pub fn account_upper_bound(account: u64) -> Vec<u8> {
    encode_action_key(account.wrapping_add(1), 0, 0)
}

/// `[prefix:1][shard:1]`
pub fn encode_checkpoint_key(shard: u8) -> Vec<u8> {
    vec![CHECKPOINT_PREFIX, shard]
}

pub fn decode_checkpoint_key(key: &[u8]) -> Result<u8> {
    if key.len() != CHECKPOINT_KEY_LEN {
        return Err(Error::ShortKey(key.to_vec()));
    }
    if key[0] != CHECKPOINT_PREFIX {
        return Err(Error::UnknownPrefix(key[0]));
    }
    Ok(key[1])
}
