use std::fmt::Display;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::config::Config;
use crate::error::Result;
use crate::level::{Level0, LevelN};
use crate::memtable::Memtable;

/// Wakes the background merger. `terminate` doubles as the tree's
/// shutdown/destroyed marker; the condvar is signalled on both new data and
/// termination.
struct MergeSignal {
    terminate: Mutex<bool>,
    new_data: Condvar,
}

/// An LSM tree: one overlapping level 0 plus at least one disjoint deeper
/// level, compacted by a dedicated background merger thread.
///
/// The tree serves `get` from level 0 downward, so recency always wins.
/// Dumping a memtable appends to level 0 and nudges the merger, which
/// cascades tables into deeper levels once a level crosses its threshold.
///
/// A clean shutdown (drop without `destroy`) merges any residual level-0
/// tables into level 1 first: level 0 encodes recency by insertion order,
/// which a reopen cannot reconstruct from the directory alone.
pub struct LsmTree {
    level0: Arc<Level0>,
    levels: Vec<Arc<LevelN>>,
    signal: Arc<MergeSignal>,
    merger: Option<JoinHandle<()>>,
}

impl LsmTree {
    /// Materialize all levels from the config and start the merger.
    pub fn open(config: &Config) -> Result<Self> {
        let mut level_configs = config.levels()?;

        let level0 = Arc::new(Level0::open(level_configs.remove(0))?);
        let levels = level_configs
            .into_iter()
            .map(|config| LevelN::open(config).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        let signal =
            Arc::new(MergeSignal { terminate: Mutex::new(false), new_data: Condvar::new() });

        let merger = {
            let level0 = level0.clone();
            let levels = levels.clone();
            let signal = signal.clone();
            std::thread::Builder::new()
                .name("emberdb-merger".into())
                .spawn(move || background_merger(&level0, &levels, &signal))?
        };

        Ok(Self { level0, levels, signal, merger: Some(merger) })
    }

    /// Probe level 0 first, then each deeper level in order. Tombstones
    /// surface as `Some` of an empty value; the store maps them to a miss.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        assert!(self.merger.is_some(), "tree has been shut down");

        if let Some(value) = self.level0.get(key) {
            return Some(value);
        }
        self.levels.iter().find_map(|level| level.get(key))
    }

    /// Dump a non-empty memtable into level 0 and wake the merger.
    pub fn dump_memtable(&self, memtable: &Memtable) -> Result<()> {
        assert!(self.merger.is_some(), "tree has been shut down");

        if memtable.is_empty() {
            return Ok(());
        }
        self.level0.dump_memtable(memtable)?;

        // Lock the signal mutex so the notification cannot slip between the
        // merger's predicate check and its wait.
        let _guard = self.signal.terminate.lock().unwrap();
        self.signal.new_data.notify_one();
        Ok(())
    }

    /// Stop the merger and delete all on-disk state. Idempotent.
    pub fn destroy(&mut self) {
        if self.merger.is_none() {
            return;
        }
        self.stop_merger();

        self.level0.destroy();
        for level in &self.levels {
            level.destroy();
        }
        tracing::info!("destroyed tree");
    }

    fn stop_merger(&mut self) {
        {
            let mut terminate = self.signal.terminate.lock().unwrap();
            *terminate = true;
            self.signal.new_data.notify_one();
        }
        if let Some(merger) = self.merger.take() {
            if merger.join().is_err() {
                tracing::error!("merger thread panicked");
            }
        }
    }

    /// Whether the merger has nothing left to do. The deepest level never
    /// merges further, so its threshold is not consulted.
    #[cfg(test)]
    fn is_quiescent(&self) -> bool {
        !self.level0.needs_merging()
            && !self.levels[..self.levels.len() - 1].iter().any(|level| level.needs_merging())
    }
}

impl Drop for LsmTree {
    fn drop(&mut self) {
        // Already shut down by destroy().
        if self.merger.is_none() {
            return;
        }
        self.stop_merger();

        // Migrate residual level-0 tables into level 1 so a reopen only
        // ever observes the disjoint-level invariant.
        if !self.level0.is_empty() {
            if let Err(e) = self.levels[0].merge_level0(&self.level0) {
                tracing::warn!(error = %e, "failed to migrate level 0 on shutdown");
            }
        }
    }
}

impl Display for LsmTree {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "level 0 - {} tables", self.level0.len())?;
        for (i, level) in self.levels.iter().enumerate() {
            writeln!(f, "level {} - {} tables", i + 1, level.len())?;
        }
        Ok(())
    }
}

/// One pass per wakeup: level 0 into level 1, then each saturated level
/// into the one below it. Reading each threshold between steps lets one
/// flush cascade through several levels in a single pass. A failed merge
/// leaves both levels in their pre-publish state, so the pass is logged and
/// the tree keeps serving reads.
fn background_merger(level0: &Level0, levels: &[Arc<LevelN>], signal: &MergeSignal) {
    let mut terminate = signal.terminate.lock().unwrap();

    loop {
        terminate = signal
            .new_data
            .wait_while(terminate, |terminate| !*terminate && !level0.needs_merging())
            .unwrap();
        if *terminate {
            return;
        }
        drop(terminate);

        if level0.needs_merging() {
            if let Err(e) = levels[0].merge_level0(level0) {
                tracing::error!(error = %e, "failed to merge level 0");
            }
        }
        for i in 1..levels.len() {
            if levels[i - 1].needs_merging() {
                if let Err(e) = levels[i].merge_level(&levels[i - 1]) {
                    tracing::error!(level = i + 1, error = %e, "failed to merge level");
                }
            }
        }

        terminate = signal.terminate.lock().unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::sorted_random_kv;
    use std::time::Duration;

    fn test_config(dir: &std::path::Path) -> Config {
        Config::new("db", dir.to_str().unwrap())
            .num_levels(4)
            .table_size(1 << 10)
            .base_threshold(2)
            .memtable_size(1024)
    }

    fn wait_for_quiescence(tree: &LsmTree) {
        for _ in 0..1000 {
            if tree.is_quiescent() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("merger did not quiesce");
    }

    #[test]
    fn test_fill_and_read_under_compaction() {
        let dir = tempfile::tempdir().unwrap();
        let mut tree = LsmTree::open(&test_config(dir.path())).unwrap();

        for batch in 0..10u64 {
            let kv = sorted_random_kv(1000, 5, batch);
            let memtable = Memtable::new();
            for (key, value) in &kv {
                memtable.add(key, value);
            }
            tree.dump_memtable(&memtable).unwrap();

            // Reads race the background merger and must still see every
            // key of the batch just written.
            for (key, value) in &kv {
                assert_eq!(tree.get(key), Some(value.clone()));
            }
        }

        tree.destroy();
    }

    #[test]
    fn test_cascading_compaction_respects_thresholds() {
        let dir = tempfile::tempdir().unwrap();
        let tree = LsmTree::open(&test_config(dir.path())).unwrap();

        let mut batches = Vec::new();
        for batch in 0..10u64 {
            let kv = sorted_random_kv(1000, 5, 100 + batch);
            let memtable = Memtable::new();
            for (key, value) in &kv {
                memtable.add(key, value);
            }
            tree.dump_memtable(&memtable).unwrap();
            batches.push(kv);
        }

        wait_for_quiescence(&tree);

        // Every level the merger drains tolerates at most t * t^i tables
        // once it is done; the deepest level absorbs the remainder.
        assert!(tree.level0.len() <= 2);
        let draining = tree.levels.len() - 1;
        for (i, level) in tree.levels.iter().take(draining).enumerate() {
            assert!(level.len() <= 2usize.pow(i as u32 + 2));
        }
        assert!(!tree.levels[draining].is_empty());

        // Every key remains readable; later batches win collisions.
        let mut expected = std::collections::BTreeMap::new();
        for kv in &batches {
            for (key, value) in kv {
                expected.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in &expected {
            assert_eq!(tree.get(key), Some(value.clone()));
        }
    }

    #[test]
    fn test_shutdown_migrates_level0_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let kv1 = sorted_random_kv(1000, 8, 41);
        let kv2 = sorted_random_kv(1000, 8, 42);

        {
            let tree = LsmTree::open(&test_config(dir.path())).unwrap();
            for kv in [&kv1, &kv2] {
                let memtable = Memtable::new();
                for (key, value) in kv {
                    memtable.add(key, value);
                }
                tree.dump_memtable(&memtable).unwrap();
            }
        }

        // Reopen: level 0 must be empty (the open asserts it) and the later
        // batch must win any key collisions.
        let mut tree = LsmTree::open(&test_config(dir.path())).unwrap();
        assert_eq!(tree.level0.len(), 0);
        for (key, value) in &kv2 {
            assert_eq!(tree.get(key), Some(value.clone()));
        }

        tree.destroy();
    }

    #[test]
    fn test_destroy_removes_all_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut tree = LsmTree::open(&test_config(dir.path())).unwrap();

        let memtable = Memtable::new();
        memtable.add(b"key", b"value");
        tree.dump_memtable(&memtable).unwrap();

        tree.destroy();
        assert!(!dir.path().join("db").exists());

        // Destroy is idempotent and drop after destroy is a no-op.
        tree.destroy();
    }

    #[test]
    fn test_empty_memtable_dump_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut tree = LsmTree::open(&test_config(dir.path())).unwrap();

        tree.dump_memtable(&Memtable::new()).unwrap();
        assert_eq!(tree.level0.len(), 0);

        tree.destroy();
    }

    #[test]
    fn test_display_lists_levels() {
        let dir = tempfile::tempdir().unwrap();
        let mut tree = LsmTree::open(&test_config(dir.path())).unwrap();

        let rendered = format!("{tree}");
        assert!(rendered.starts_with("level 0 - 0 tables"));
        assert_eq!(rendered.lines().count(), 4);

        tree.destroy();
    }
}
