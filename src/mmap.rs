//! A fixed-size memory-mapped file that grows from both ends.
//!
//! SSTables stream records forward from offset 0 (the head) while their
//! offset index accumulates backward from the end of the file (the tail).
//! A single fixed-size mapping serves both: writers append into the middle
//! gap, readers map the finished file read-only. Files are never truncated;
//! the unused gap between head and tail stays zero.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut};

use crate::error::Result;

enum Mapping {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

pub struct AppendableMmap {
    map: Mapping,
    /// Backing file, if any. Anonymous mappings have none.
    path: Option<PathBuf>,
    size: usize,
    head: usize,
    tail: usize,
}

impl AppendableMmap {
    /// Map an existing file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let size = file.metadata()?.len() as usize;
        let map = unsafe { Mmap::map(&file)? };

        Ok(Self {
            map: Mapping::ReadOnly(map),
            path: Some(path),
            size,
            head: 0,
            tail: size - 1,
        })
    }

    /// Create a zero-filled file of exactly `size` bytes and map it
    /// read-write. Fails if the path already exists.
    pub fn create(path: impl AsRef<Path>, size: usize) -> Result<Self> {
        assert!(size > 0);

        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).create_new(true).open(&path)?;
        file.set_len(size as u64)?;
        let map = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self {
            map: Mapping::ReadWrite(map),
            path: Some(path),
            size,
            head: 0,
            tail: size - 1,
        })
    }

    /// Map `size` bytes of RAM with no backing file. Used by merges into
    /// levels without a directory, and by tests.
    pub fn anonymous(size: usize) -> Result<Self> {
        assert!(size > 0);

        let map = MmapMut::map_anon(size)?;
        Ok(Self { map: Mapping::ReadWrite(map), path: None, size, head: 0, tail: size - 1 })
    }

    /// Copy `bytes` at the head index and advance it.
    pub fn append_head(&mut self, bytes: &[u8]) {
        assert!(bytes.len() <= self.free());
        let head = self.head;
        self.as_mut_slice()[head..head + bytes.len()].copy_from_slice(bytes);
        self.head += bytes.len();
    }

    /// Copy `bytes` ending at the tail index and retreat it.
    pub fn append_tail(&mut self, bytes: &[u8]) {
        assert!(bytes.len() <= self.free());
        let end = self.tail + 1;
        self.as_mut_slice()[end - bytes.len()..end].copy_from_slice(bytes);
        self.tail -= bytes.len();
    }

    pub fn data(&self) -> &[u8] {
        match &self.map {
            Mapping::ReadOnly(map) => map,
            Mapping::ReadWrite(map) => map,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn head_index(&self) -> usize {
        self.head
    }

    pub fn tail_index(&self) -> usize {
        self.tail
    }

    /// Bytes remaining between the two regions.
    pub fn free(&self) -> usize {
        self.tail + 1 - self.head
    }

    /// Remove the backing file. The mapping stays valid until drop, so
    /// existing readers keep working while the directory entry is gone.
    pub fn unlink(&self) {
        if let Some(path) = &self.path {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to unlink table file");
            }
        }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.map {
            Mapping::ReadWrite(map) => map,
            Mapping::ReadOnly(_) => panic!("append to a read-only mapping"),
        }
    }
}

impl Drop for AppendableMmap {
    fn drop(&mut self) {
        if let Mapping::ReadWrite(map) = &self.map {
            if let Err(e) = map.flush() {
                tracing::warn!(error = %e, "failed to sync mapping");
            }
        }
    }
}
