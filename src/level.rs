//! Tiered table storage.
//!
//! [`Level0`] receives memtable dumps, so its tables may overlap and their
//! insertion order encodes recency. [`LevelN`] holds tables that are
//! pairwise disjoint and sorted by min key, so a point lookup probes at most
//! one table. Compaction moves tables downward: the merger snapshots the
//! lower level under its lock, merges without holding the upper level's
//! write lock, and publishes the result under both locks so readers see
//! either the pre- or post-merge table set, never a mix.

use std::fs;
use std::sync::{Arc, RwLock};

use crate::config::LevelConfig;
use crate::error::Result;
use crate::memtable::Memtable;
use crate::sstable::{merge_tables, Table, TableBuilder};

/// State shared by both level kinds: the config and the table list.
struct LevelCore {
    config: LevelConfig,
    tables: RwLock<Vec<Arc<Table>>>,
}

impl LevelCore {
    /// Bootstrap the level directory and load any tables in it, sorted by
    /// min key. With `overwrite` set the directory is wiped first.
    fn open(config: LevelConfig) -> Result<Self> {
        if config.overwrite {
            match fs::remove_dir_all(&config.path_level) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }
        fs::create_dir_all(&config.path_level)?;

        let mut tables = Vec::new();
        for entry in fs::read_dir(&config.path_level)? {
            tables.push(Arc::new(Table::load(entry?.path())?));
        }
        tables.sort_by(|x, y| x.min_key().cmp(y.min_key()));

        Ok(Self { config, tables: RwLock::new(tables) })
    }

    fn len(&self) -> usize {
        self.tables.read().unwrap().len()
    }

    fn needs_merging(&self) -> bool {
        self.len() > self.config.threshold
    }

    /// Drop all tables and remove the level directory. The database
    /// directory goes with the last level that empties it.
    fn destroy(&self) {
        let mut tables = self.tables.write().unwrap();
        tables.clear();
        if let Err(e) = fs::remove_dir_all(&self.config.path_level) {
            tracing::warn!(
                path = %self.config.path_level.display(),
                error = %e,
                "failed to remove level directory"
            );
        }
        // Succeeds only once no other level directory remains.
        let _ = fs::remove_dir(&self.config.path_db);
    }
}

/// The level memtables are dumped into. Tables may overlap; later tables
/// shadow earlier ones.
pub struct Level0 {
    core: LevelCore,
}

impl Level0 {
    pub fn open(config: LevelConfig) -> Result<Self> {
        let core = LevelCore::open(config)?;
        // A clean shutdown migrates residual level-0 tables into level 1,
        // so a reopened level 0 always starts empty.
        assert!(
            core.tables.read().unwrap().is_empty(),
            "level 0 directory must be empty on open"
        );
        Ok(Self { core })
    }

    /// Scan tables newest-first and return the first hit, tombstones
    /// included.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.core.tables.read().unwrap().iter().rev().find_map(|table| table.get(key))
    }

    /// Build tables from a memtable and append them to this level. Building
    /// happens outside the lock; only the list append is exclusive.
    pub fn dump_memtable(&self, memtable: &Memtable) -> Result<()> {
        let mut builder =
            TableBuilder::new(self.core.config.table_size, Some(&self.core.config.path_level));
        let mut tables = Vec::new();

        for entry in memtable.iter() {
            if !builder.add(entry.key(), entry.value())? {
                if let Some(table) = builder.finalize()? {
                    tables.push(Arc::new(table));
                }
                let added = builder.add(entry.key(), entry.value())?;
                assert!(added, "record must fit a fresh table");
            }
        }
        if let Some(table) = builder.finalize()? {
            tables.push(Arc::new(table));
        }

        tracing::debug!(tables = tables.len(), "dumped memtable into level 0");
        self.core.tables.write().unwrap().extend(tables);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.core.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn needs_merging(&self) -> bool {
        self.core.needs_merging()
    }

    pub fn destroy(&self) {
        self.core.destroy()
    }
}

/// A level below level 0: disjoint tables sorted by min key. Only the
/// merger thread mutates these levels, so the table list cannot change
/// between a merge's planning and publish phases.
pub struct LevelN {
    core: LevelCore,
}

impl LevelN {
    pub fn open(config: LevelConfig) -> Result<Self> {
        Ok(Self { core: LevelCore::open(config)? })
    }

    /// Binary search for the single table whose key range can contain the
    /// key, then probe it.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let tables = self.core.tables.read().unwrap();
        let i = tables.partition_point(|table| table.max_key() < key);
        match tables.get(i) {
            Some(table) if table.min_key() <= key => table.get(key),
            _ => None,
        }
    }

    /// Merge all of level 0 into this level.
    ///
    /// The snapshot is reversed so the newest level-0 table has the highest
    /// merge precedence, and this level's overlapping tables are appended
    /// after it so the snapshot shadows them.
    pub fn merge_level0(&self, level0: &Level0) -> Result<()> {
        // Concurrent writers append to level 0, so snapshot under its lock.
        // Appends after this point land beyond the snapshotted prefix and
        // survive the publish below.
        let (mut inputs, snapshot_len) = {
            let tables = level0.core.tables.read().unwrap();
            (tables.iter().rev().cloned().collect::<Vec<_>>(), tables.len())
        };
        if inputs.is_empty() {
            return Ok(());
        }

        let (span, merged) = self.plan_and_merge(&mut inputs)?;

        let mut lower = level0.core.tables.write().unwrap();
        let mut own = self.core.tables.write().unwrap();
        // The snapshot was reversed, so the erased prefix is exactly the
        // snapshotted tables in insertion order.
        lower.drain(..snapshot_len);
        own.splice(span, merged);
        Ok(())
    }

    /// Merge the level directly above this one (level index N-1, N >= 2)
    /// into this level. The lower level already holds a disjoint ascending
    /// run, which is precedence-correct as-is.
    pub fn merge_level(&self, lower_level: &LevelN) -> Result<()> {
        let (mut inputs, snapshot_len) = {
            let tables = lower_level.core.tables.read().unwrap();
            (tables.clone(), tables.len())
        };
        if inputs.is_empty() {
            return Ok(());
        }

        let (span, merged) = self.plan_and_merge(&mut inputs)?;

        let mut lower = lower_level.core.tables.write().unwrap();
        let mut own = self.core.tables.write().unwrap();
        lower.drain(..snapshot_len);
        own.splice(span, merged);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.core.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn needs_merging(&self) -> bool {
        self.core.needs_merging()
    }

    pub fn destroy(&self) {
        self.core.destroy()
    }

    /// Shared planning tail of both merge paths: extend `inputs` with this
    /// level's overlapping span and run the merge without holding any write
    /// lock. Returns the span to splice the merged run over; splicing there
    /// keeps the level sorted and disjoint, also when the span is empty.
    fn plan_and_merge(
        &self,
        inputs: &mut Vec<Arc<Table>>,
    ) -> Result<(std::ops::Range<usize>, Vec<Arc<Table>>)> {
        // Key range covered by the snapshot.
        let mut min = inputs[0].min_key().to_vec();
        let mut max = inputs[0].max_key().to_vec();
        for table in inputs.iter() {
            if table.min_key() < &min[..] {
                min = table.min_key().to_vec();
            }
            if table.max_key() > &max[..] {
                max = table.max_key().to_vec();
            }
        }

        // Find this level's contiguous overlapping span, appended after the
        // snapshot so the snapshot shadows it. Only the merger mutates this
        // level, so the indices stay valid after the read lock is released.
        let span = {
            let tables = self.core.tables.read().unwrap();
            let start = tables.partition_point(|t| t.max_key() < &min[..]);
            let end = tables.partition_point(|t| t.min_key() <= &max[..]);
            inputs.extend(tables[start..end].iter().cloned());
            start..end
        };

        let merged = merge_tables(
            inputs,
            self.core.config.table_size,
            Some(&self.core.config.path_level),
        )?;

        tracing::info!(
            level = self.core.config.level,
            inputs = inputs.len(),
            outputs = merged.len(),
            "merged tables into level"
        );

        Ok((span, merged))
    }
}
