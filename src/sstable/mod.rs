//! Immutable sorted tables and their construction.
//!
//! ## SSTable file layout
//!
//! A table is a fixed-size memory-mapped file filled from both ends:
//!
//! ```text
//! +--------------------------+  offset 0
//! | record 0                 |
//! | record 1                 |
//! | ...                      |  head region, ascending key order
//! | record E-1               |
//! +--------------------------+
//! | (unused, zero)           |
//! +--------------------------+
//! | offset[0] .. offset[E-1] |  u32 LE record offsets, tail region
//! +--------------------------+
//! | E (u32 LE)               |  last 4 bytes of the file
//! +--------------------------+
//! ```
//!
//! Each record is `u16 key_len · key · u16 value_len · value`, little
//! endian, both lengths below 65 536. A zero-length value is a tombstone.
//! Keys are strictly ascending within one table, compared bytewise with the
//! shorter key winning a shared prefix (the `Ord` of `[u8]`).

mod builder;
mod merge;
mod table;

pub use builder::TableBuilder;
pub use merge::merge_tables;
pub use table::{Table, TableIter};

use byteorder::{ByteOrder, LittleEndian};

use crate::mmap::AppendableMmap;

/// Bytes of the `u16` length prefix in front of a key or value.
const LEN_SIZE: usize = 2;
/// Bytes of one `u32` index entry, and of the trailing entry count.
const OFFSET_SIZE: usize = 4;

/// Encoded size of one record.
fn record_size(key: &[u8], value: &[u8]) -> usize {
    2 * LEN_SIZE + key.len() + value.len()
}

/// Append one length-prefixed record at the head of the mapping.
fn write_record(mmap: &mut AppendableMmap, key: &[u8], value: &[u8]) {
    let mut len = [0u8; LEN_SIZE];
    LittleEndian::write_u16(&mut len, key.len() as u16);
    mmap.append_head(&len);
    mmap.append_head(key);
    LittleEndian::write_u16(&mut len, value.len() as u16);
    mmap.append_head(&len);
    mmap.append_head(value);
}

/// Decode the record starting at `offset`, returning its key and value as
/// slices into `data`.
fn read_record(data: &[u8], offset: usize) -> (&[u8], &[u8]) {
    let key_len = LittleEndian::read_u16(&data[offset..]) as usize;
    let key_start = offset + LEN_SIZE;
    let key = &data[key_start..key_start + key_len];

    let value_len = LittleEndian::read_u16(&data[key_start + key_len..]) as usize;
    let value_start = key_start + key_len + LEN_SIZE;
    let value = &data[value_start..value_start + value_len];

    (key, value)
}
