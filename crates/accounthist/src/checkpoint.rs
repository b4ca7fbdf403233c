//! Per-shard checkpoint: the last durably-written block, for crash recovery.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShardCheckpoint {
    pub last_written_block_num: u64,
    pub last_written_block_id: String,
}

/// `[block_num:8BE][block_id_len:4BE][block_id bytes]`
pub fn encode_checkpoint(cp: &ShardCheckpoint) -> Vec<u8> {
    let id = cp.last_written_block_id.as_bytes();
    let mut buf = Vec::with_capacity(8 + 4 + id.len());
    buf.write_u64::<BigEndian>(cp.last_written_block_num).unwrap();
    buf.write_u32::<BigEndian>(id.len() as u32).unwrap();
    buf.extend_from_slice(id);
    buf
}

pub fn decode_checkpoint(bytes: &[u8]) -> Result<ShardCheckpoint> {
    let mut cursor = Cursor::new(bytes);
    let last_written_block_num = cursor
        .read_u64::<BigEndian>()
        .map_err(|e| Error::decode("checkpoint block_num", bytes.to_vec(), e))?;
    let id_len = cursor
        .read_u32::<BigEndian>()
        .map_err(|e| Error::decode("checkpoint block_id length", bytes.to_vec(), e))? as usize;

    let start = cursor.position() as usize;
    let end = start
        .checked_add(id_len)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| {
            Error::decode(
                "checkpoint block_id bounds",
                bytes.to_vec(),
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "block_id overruns row"),
            )
        })?;

    let last_written_block_id = String::from_utf8(bytes[start..end].to_vec())
        .map_err(|e| Error::decode("checkpoint block_id utf8", bytes.to_vec(), e))?;

    Ok(ShardCheckpoint {
        last_written_block_num,
        last_written_block_id,
    })
}
