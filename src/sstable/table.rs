use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};

use super::{read_record, record_size, OFFSET_SIZE};
use crate::errdata;
use crate::error::Result;
use crate::mmap::AppendableMmap;

/// A read-only handle to one finalized SSTable.
///
/// The table exclusively owns its mapping; the file may already be unlinked
/// (compaction removes inputs eagerly) in which case the data stays readable
/// until the table is dropped.
pub struct Table {
    mmap: AppendableMmap,
    num_entries: usize,
    /// Byte offset of the first index entry.
    index_start: usize,
    /// Byte offset one past the last record.
    end: usize,
    min_key: Vec<u8>,
    max_key: Vec<u8>,
}

impl Table {
    /// Wrap a mapping containing a finalized table. Reads the entry count
    /// from the last four bytes, locates the offset index in front of it and
    /// caches the key range.
    pub fn from_mmap(mmap: AppendableMmap) -> Result<Self> {
        let data = mmap.data();
        let size = mmap.size();
        if size < 2 * OFFSET_SIZE {
            return errdata!("table file of {size} bytes is too small for an index");
        }

        let num_entries = LittleEndian::read_u32(&data[size - OFFSET_SIZE..]) as usize;
        if num_entries == 0 {
            return errdata!("table file contains no entries");
        }

        let index_start = match (size - OFFSET_SIZE).checked_sub(num_entries * OFFSET_SIZE) {
            Some(start) => start,
            None => {
                return errdata!("index of {num_entries} entries does not fit a {size} byte table")
            }
        };

        let mut table = Self {
            mmap,
            num_entries,
            index_start,
            end: 0,
            min_key: Vec::new(),
            max_key: Vec::new(),
        };

        let min_key = table.entry(0).0.to_vec();
        let (max_key, last_value) = table.entry(num_entries - 1);
        let end = table.offset(num_entries - 1) + record_size(max_key, last_value);
        table.max_key = max_key.to_vec();
        table.min_key = min_key;
        table.end = end;

        if table.end > table.index_start {
            return errdata!("table records overlap the offset index");
        }
        Ok(table)
    }

    /// Load a table file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_mmap(AppendableMmap::open(path)?)
    }

    /// Binary search for a key, returning a copy of its value. A stored
    /// tombstone returns `Some` of an empty value.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let mut min = 0;
        let mut max = self.num_entries;

        while min < max {
            let half = (min + max) / 2;
            let (entry_key, value) = self.entry(half);
            match key.cmp(entry_key) {
                std::cmp::Ordering::Less => max = half,
                std::cmp::Ordering::Greater => min = half + 1,
                std::cmp::Ordering::Equal => return Some(value.to_vec()),
            }
        }

        None
    }

    /// The `i`-th record in key order.
    pub fn entry(&self, i: usize) -> (&[u8], &[u8]) {
        assert!(i < self.num_entries);
        read_record(self.mmap.data(), self.offset(i))
    }

    /// Iterate over all records in key order.
    pub fn iter(&self) -> TableIter<'_> {
        TableIter { data: self.mmap.data(), pos: 0, end: self.end }
    }

    pub fn len(&self) -> usize {
        self.num_entries
    }

    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }

    pub fn min_key(&self) -> &[u8] {
        &self.min_key
    }

    pub fn max_key(&self) -> &[u8] {
        &self.max_key
    }

    /// Remove the backing file; the mapped data stays readable until drop.
    pub fn unlink(&self) {
        self.mmap.unlink();
    }

    fn offset(&self, i: usize) -> usize {
        let at = self.index_start + i * OFFSET_SIZE;
        LittleEndian::read_u32(&self.mmap.data()[at..]) as usize
    }
}

/// Forward iterator walking the head region record by record.
pub struct TableIter<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> Iterator for TableIter<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }
        let (key, value) = read_record(self.data, self.pos);
        self.pos += record_size(key, value);
        Some((key, value))
    }
}
