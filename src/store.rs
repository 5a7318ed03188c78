use crate::config::Config;
use crate::error::Result;
use crate::memtable::Memtable;
use crate::tree::LsmTree;

/// A single-shard store: a memtable in front of an LSM tree.
///
/// Writes land in the memtable and flush into the tree once it exceeds the
/// configured size. Deletions write a tombstone (an empty value) which
/// shadows older versions down the tree until a merge collapses it. Reads
/// check the memtable first and surface both misses and tombstones as
/// `None`.
///
/// There is no write-ahead log: writes still in the memtable are lost on a
/// crash. Dropping the store flushes the residual memtable, so a clean
/// shutdown loses nothing.
pub struct KvStore {
    config: Config,
    tree: LsmTree,
    memtable: Memtable,
    destroyed: bool,
}

impl KvStore {
    pub fn open(config: Config) -> Result<Self> {
        let tree = LsmTree::open(&config)?;
        Ok(Self { config, tree, memtable: Memtable::new(), destroyed: false })
    }

    /// Insert or update a key. Both key and value must be non-empty; empty
    /// values are reserved for tombstones, which only `remove` may write.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        assert!(!self.destroyed, "store has been destroyed");
        assert!(!key.is_empty() && !value.is_empty());

        self.memtable.add(key, value);
        if self.memtable.size() > self.config.memtable_size {
            self.tree.dump_memtable(&self.memtable)?;
            self.memtable.clear();
        }
        Ok(())
    }

    /// Look up a key. Returns `None` for missing keys and for keys whose
    /// most recent write was a `remove`.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        assert!(!self.destroyed, "store has been destroyed");

        let value = self.memtable.get(key).or_else(|| self.tree.get(key));
        value.filter(|value| !value.is_empty())
    }

    /// Delete a key by writing a tombstone.
    pub fn remove(&mut self, key: &[u8]) {
        assert!(!self.destroyed, "store has been destroyed");
        assert!(!key.is_empty());

        self.memtable.add(key, b"");
    }

    /// Erase all in-memory and on-disk state.
    pub fn destroy(&mut self) {
        assert!(!self.destroyed, "store has been destroyed");

        self.memtable.clear();
        self.tree.destroy();
        self.destroyed = true;
    }
}

impl Drop for KvStore {
    fn drop(&mut self) {
        if self.destroyed {
            return;
        }
        if let Err(e) = self.tree.dump_memtable(&self.memtable) {
            tracing::warn!(error = %e, "failed to flush memtable on close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> Config {
        Config::new("db", dir.to_str().unwrap())
            .num_levels(4)
            .table_size(1 << 10)
            .base_threshold(17)
            .memtable_size(1024)
    }

    #[test]
    fn test_add_remove_restore_destroy() {
        let dir = tempfile::tempdir().unwrap();

        let mut store = KvStore::open(test_config(dir.path())).unwrap();
        store.add(b"foo", b"bar").unwrap();
        assert_eq!(store.get(b"foo"), Some(b"bar".to_vec()));

        store.remove(b"foo");
        assert_eq!(store.get(b"foo"), None);

        // The latest add survives a close and reopen.
        store.add(b"foo", b"bar").unwrap();
        drop(store);

        let mut store = KvStore::open(test_config(dir.path())).unwrap();
        assert_eq!(store.get(b"foo"), Some(b"bar".to_vec()));

        store.destroy();
        assert!(!dir.path().join("db").exists());
    }

    #[test]
    fn test_tombstone_survives_restart() {
        let dir = tempfile::tempdir().unwrap();

        {
            let mut store = KvStore::open(test_config(dir.path())).unwrap();
            store.add(b"keep", b"1").unwrap();
            store.add(b"gone", b"2").unwrap();
            store.remove(b"gone");
        }

        let mut store = KvStore::open(test_config(dir.path())).unwrap();
        assert_eq!(store.get(b"keep"), Some(b"1".to_vec()));
        assert_eq!(store.get(b"gone"), None);
        store.destroy();
    }

    #[test]
    fn test_memtable_flushes_at_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KvStore::open(test_config(dir.path()).memtable_size(64)).unwrap();

        for i in 0..20u32 {
            let key = format!("key_{i:03}");
            store.add(key.as_bytes(), b"0123456789").unwrap();
        }

        // The memtable crossed the 64 byte budget several times, so most
        // writes already live in the tree.
        assert!(store.memtable.size() <= 64 + 24);
        for i in 0..20u32 {
            let key = format!("key_{i:03}");
            assert_eq!(store.get(key.as_bytes()), Some(b"0123456789".to_vec()));
        }

        store.destroy();
    }

    #[test]
    fn test_overwrite_flag_discards_existing_state() {
        let dir = tempfile::tempdir().unwrap();

        {
            let mut store = KvStore::open(test_config(dir.path())).unwrap();
            store.add(b"stale", b"state").unwrap();
        }

        let store = KvStore::open(test_config(dir.path()).overwrite(true)).unwrap();
        assert_eq!(store.get(b"stale"), None);

        // Every level directory exists and is empty.
        for level in 0..4 {
            let path = dir.path().join("db").join(level.to_string());
            assert!(path.exists());
            assert_eq!(std::fs::read_dir(&path).unwrap().count(), 0);
        }
    }

    #[test]
    #[should_panic]
    fn test_add_empty_value_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KvStore::open(test_config(dir.path())).unwrap();
        let _ = store.add(b"key", b"");
    }

    #[test]
    #[should_panic]
    fn test_use_after_destroy_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KvStore::open(test_config(dir.path())).unwrap();
        store.destroy();
        let _ = store.get(b"key");
    }
}
