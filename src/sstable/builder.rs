use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use uuid::Uuid;

use super::{record_size, write_record, Table, OFFSET_SIZE};
use crate::error::Result;
use crate::mmap::AppendableMmap;

/// Streams sorted records into SSTable files of a fixed byte budget.
///
/// The mapping is allocated lazily on the first `add`: file-backed with a
/// v4 UUID name when the builder has a directory, anonymous otherwise.
/// `finalize` writes the offset index into the tail region, hands the
/// mapping off to the returned [`Table`] and resets the builder for reuse.
pub struct TableBuilder {
    mmap: Option<AppendableMmap>,
    offsets: Vec<u32>,
    table_size: u32,
    dir: Option<PathBuf>,
}

impl TableBuilder {
    pub fn new(table_size: u32, dir: Option<&Path>) -> Self {
        Self { mmap: None, offsets: Vec::new(), table_size, dir: dir.map(Path::to_path_buf) }
    }

    /// Append a record. Returns `false` without writing when the record plus
    /// the grown index would exceed the table budget; the caller finalizes
    /// the current table and retries against a fresh one.
    ///
    /// Keys must arrive in strictly ascending order and must not be empty.
    /// Empty values are tombstones and pass through.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<bool> {
        assert!(!key.is_empty());
        assert!(key.len() < u16::MAX as usize && value.len() < u16::MAX as usize);

        let head = self.mmap.as_ref().map_or(0, |m| m.head_index());
        let index_size = (self.offsets.len() + 1) * OFFSET_SIZE + OFFSET_SIZE;
        if head + record_size(key, value) + index_size > self.table_size as usize {
            return Ok(false);
        }

        if self.mmap.is_none() {
            self.mmap = Some(Self::allocate(self.table_size, self.dir.as_deref())?);
        }
        let Some(mmap) = self.mmap.as_mut() else { unreachable!() };

        self.offsets.push(mmap.head_index() as u32);
        write_record(mmap, key, value);
        Ok(true)
    }

    /// Bytes the table would occupy if finalized now: records plus index
    /// plus the trailing entry count.
    pub fn current_size(&self) -> usize {
        let head = self.mmap.as_ref().map_or(0, |m| m.head_index());
        head + self.offsets.len() * OFFSET_SIZE + OFFSET_SIZE
    }

    /// Write the offset index and entry count into the tail region and
    /// return the finished table, or `None` when nothing was added. The
    /// builder is reset either way.
    pub fn finalize(&mut self) -> Result<Option<Table>> {
        let mut mmap = match self.mmap.take() {
            Some(mmap) if mmap.head_index() > 0 => mmap,
            _ => {
                self.offsets.clear();
                return Ok(None);
            }
        };

        let mut buf = [0u8; OFFSET_SIZE];
        LittleEndian::write_u32(&mut buf, self.offsets.len() as u32);
        mmap.append_tail(&buf);

        let mut index = Vec::with_capacity(self.offsets.len() * OFFSET_SIZE);
        for offset in &self.offsets {
            LittleEndian::write_u32(&mut buf, *offset);
            index.extend_from_slice(&buf);
        }
        mmap.append_tail(&index);

        self.offsets.clear();
        Ok(Some(Table::from_mmap(mmap)?))
    }

    fn allocate(table_size: u32, dir: Option<&Path>) -> Result<AppendableMmap> {
        match dir {
            Some(dir) => {
                let name = Uuid::new_v4().to_string();
                AppendableMmap::create(dir.join(name), table_size as usize)
            }
            None => AppendableMmap::anonymous(table_size as usize),
        }
    }
}
