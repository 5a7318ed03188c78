use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_skiplist::map::{Entry, Iter};
use crossbeam_skiplist::SkipMap;

/// An in-memory ordered map buffering recent writes before they are flushed
/// into level 0.
///
/// Keys are compared lexicographically by unsigned byte, shorter keys first
/// on a shared prefix, which is the `Ord` of `[u8]` and also the order of the
/// on-disk tables. A zero-length value is a tombstone; deletions are upserts,
/// never removals, so the tombstone is carried into the next flush.
///
/// Writes are serialized by the owning store's worker thread; `size` tracks
/// the byte total of all live keys and values.
#[derive(Debug, Default)]
pub struct Memtable {
    data: SkipMap<Vec<u8>, Vec<u8>>,
    size: AtomicUsize,
}

impl Memtable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a memtable from literal pairs. Used for testing purposes.
    pub fn from_pairs<K: AsRef<[u8]>, V: AsRef<[u8]>>(pairs: &[(K, V)]) -> Self {
        let memtable = Self::new();
        for (key, value) in pairs {
            memtable.add(key.as_ref(), value.as_ref());
        }
        memtable
    }

    /// Insert or update a key. Updates adjust the size accumulator by the
    /// value-length delta.
    pub fn add(&self, key: &[u8], value: &[u8]) {
        match self.data.get(key) {
            Some(entry) => {
                let old_len = entry.value().len();
                self.data.insert(key.to_vec(), value.to_vec());
                self.size.fetch_sub(old_len, Ordering::SeqCst);
                self.size.fetch_add(value.len(), Ordering::SeqCst);
            }
            None => {
                self.data.insert(key.to_vec(), value.to_vec());
                self.size.fetch_add(key.len() + value.len(), Ordering::SeqCst);
            }
        }
    }

    /// Retrieve a copy of the value for a key. A present tombstone returns
    /// `Some` of an empty value; resolving it is the store's concern.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.get(key).map(|entry| entry.value().clone())
    }

    /// Iterate over entries in ascending key order.
    pub fn iter(&self) -> Iter<'_, Vec<u8>, Vec<u8>> {
        self.data.iter()
    }

    /// Total bytes of live keys and values.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drop all entries and reset the size accumulator.
    pub fn clear(&mut self) {
        self.data = SkipMap::new();
        self.size.store(0, Ordering::SeqCst);
    }
}

impl<'a> IntoIterator for &'a Memtable {
    type Item = Entry<'a, Vec<u8>, Vec<u8>>;
    type IntoIter = Iter<'a, Vec<u8>, Vec<u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
