//! Wire representation of an action row, and the append-on-write watermark trick.
//!
//! A row's base encoding holds the opaque upstream trace bytes plus the
//! action's `global_seq`. When the Window Maintainer trims an account's
//! window, the *next* write for that account appends a small tagged fragment
//! carrying the new `last_deleted_ordinal` onto the end of the row bytes,
//! rather than rewriting the whole row. The wire format is a flat sequence of
//! `(tag: u8, len: u32 LE, value)` fields; on decode, later occurrences of a
//! tag win. Appending a fragment after the base encoding is therefore a cheap,
//! self-contained way to "patch" one field of an already-serialized row.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::error::{Error, Result};

const TAG_RAW_TRACE: u8 = 1;
const TAG_GLOBAL_SEQ: u8 = 2;
const TAG_LAST_DELETED_ORDINAL: u8 = 3;

/// A decoded action row: the opaque upstream trace, the action's global
/// sequence, and (if present) the account's watermark as of this write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRow {
    pub raw_trace: Vec<u8>,
    pub global_seq: u64,
    pub last_deleted_ordinal: u64,
}

/// Encodes the base row for a fresh write: the upstream trace plus its
/// `global_seq`. `last_deleted_ordinal` is omitted entirely when zero,
/// matching the reference's "only append when non-zero" rule.
pub fn encode_base_row(raw_trace: &[u8], global_seq: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(raw_trace.len() + 32);
    write_field(&mut buf, TAG_RAW_TRACE, raw_trace);
    let mut seq_buf = [0u8; 8];
    (&mut seq_buf[..]).write_u64::<LittleEndian>(global_seq).unwrap();
    write_field(&mut buf, TAG_GLOBAL_SEQ, &seq_buf);
    buf
}

/// Appends a `last_deleted_ordinal` watermark fragment onto an already-encoded
/// row. The decoder reads fields left to right and keeps the last value seen
/// for a given tag, so this overrides without touching the original bytes.
pub fn append_watermark(row: &mut Vec<u8>, last_deleted_ordinal: u64) {
    let mut ord_buf = [0u8; 8];
    (&mut ord_buf[..])
        .write_u64::<LittleEndian>(last_deleted_ordinal)
        .unwrap();
    write_field(row, TAG_LAST_DELETED_ORDINAL, &ord_buf);
}

/// Convenience: build the final bytes to `put` for one write, applying the
/// watermark append only when `last_deleted_ordinal != 0`.
pub fn encode_row(raw_trace: &[u8], global_seq: u64, last_deleted_ordinal: u64) -> Vec<u8> {
    let mut row = encode_base_row(raw_trace, global_seq);
    if last_deleted_ordinal != 0 {
        append_watermark(&mut row, last_deleted_ordinal);
    }
    row
}

pub fn decode_row(bytes: &[u8]) -> Result<ActionRow> {
    let mut raw_trace = None;
    let mut global_seq = None;
    let mut last_deleted_ordinal = 0u64;

    let mut cursor = Cursor::new(bytes);
    while (cursor.position() as usize) < bytes.len() {
        let tag = cursor
            .read_u8()
            .map_err(|e| Error::decode("action row tag", bytes.to_vec(), e))?;
        let len = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::decode("action row field length", bytes.to_vec(), e))?
            as usize;

        let start = cursor.position() as usize;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| {
                Error::decode(
                    "action row field bounds",
                    bytes.to_vec(),
                    std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "field overruns row"),
                )
            })?;
        let value = &bytes[start..end];
        cursor.set_position(end as u64);

        match tag {
            TAG_RAW_TRACE => raw_trace = Some(value.to_vec()),
            TAG_GLOBAL_SEQ => {
                global_seq = Some(
                    (&value[..])
                        .read_u64::<LittleEndian>()
                        .map_err(|e| Error::decode("action row global_seq", bytes.to_vec(), e))?,
                )
            }
            TAG_LAST_DELETED_ORDINAL => {
                last_deleted_ordinal = (&value[..])
                    .read_u64::<LittleEndian>()
                    .map_err(|e| Error::decode("action row watermark", bytes.to_vec(), e))?
            }
            _ => { /* forward-compatible: ignore unknown tags */ }
        }
    }

    Ok(ActionRow {
        raw_trace: raw_trace.ok_or_else(|| {
            Error::decode(
                "action row raw_trace",
                bytes.to_vec(),
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "missing raw_trace field"),
            )
        })?,
        global_seq: global_seq.ok_or_else(|| {
            Error::decode(
                "action row global_seq",
                bytes.to_vec(),
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "missing global_seq field"),
            )
        })?,
        last_deleted_ordinal,
    })
}

fn write_field(buf: &mut Vec<u8>, tag: u8, value: &[u8]) {
    buf.push(tag);
    buf.write_u32::<LittleEndian>(value.len() as u32).unwrap();
    buf.extend_from_slice(value);
}
