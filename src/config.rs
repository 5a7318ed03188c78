use std::path::PathBuf;

use crate::errinput;
use crate::error::Result;

/// Configuration for a store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database name, used as the on-disk directory name. Must be non-empty.
    pub name: String,

    /// Either a single directory used by every level, or a comma-separated
    /// list with exactly one directory per level.
    pub path: String,

    /// Number of levels including level 0 (default: 4, minimum: 2).
    pub num_levels: usize,

    /// Byte budget per SSTable file (default: 1MB). Must be strictly larger
    /// than the largest single record plus 8 bytes of index overhead, or
    /// merges cannot roll over to a fresh table.
    pub table_size: u32,

    /// Base compaction threshold t; level i compacts beyond t * t^i tables
    /// (default: 4, minimum: 1).
    pub base_threshold: usize,

    /// Memtable flush trigger in bytes (default: 64MB).
    pub memtable_size: usize,

    /// Number of shards for the parallel store (default: 1).
    pub parallelism: usize,

    /// Delete each level directory on open (default: false).
    pub overwrite: bool,
}

/// Derived per-level configuration.
#[derive(Debug, Clone)]
pub struct LevelConfig {
    /// Base directory this level lives under.
    pub path: PathBuf,
    /// Database directory: `<path>/<db_name>`.
    pub path_db: PathBuf,
    /// Level directory: `<path>/<db_name>/<level>`.
    pub path_level: PathBuf,
    /// Level index, 0-based.
    pub level: usize,
    /// Byte budget per SSTable file.
    pub table_size: u32,
    /// Table count beyond which this level needs merging.
    pub threshold: usize,
    /// Delete the level directory on open.
    pub overwrite: bool,
}

impl LevelConfig {
    pub fn new(
        path: impl Into<PathBuf>,
        db_name: &str,
        level: usize,
        table_size: u32,
        threshold: usize,
        overwrite: bool,
    ) -> Self {
        let path = path.into();
        let path_db = path.join(db_name);
        let path_level = path_db.join(level.to_string());
        Self { path, path_db, path_level, level, table_size, threshold, overwrite }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: String::new(),
            path: String::new(),
            num_levels: 4,
            table_size: 1 << 20,
            base_threshold: 4,
            memtable_size: 64 * 1024 * 1024,
            parallelism: 1,
            overwrite: false,
        }
    }
}

impl Config {
    /// Create a new config with the given database name and path.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self { name: name.into(), path: path.into(), ..Default::default() }
    }

    /// Set the number of levels.
    pub fn num_levels(mut self, num_levels: usize) -> Self {
        self.num_levels = num_levels;
        self
    }

    /// Set the SSTable byte budget.
    pub fn table_size(mut self, table_size: u32) -> Self {
        self.table_size = table_size;
        self
    }

    /// Set the base compaction threshold.
    pub fn base_threshold(mut self, base_threshold: usize) -> Self {
        self.base_threshold = base_threshold;
        self
    }

    /// Set the memtable flush trigger.
    pub fn memtable_size(mut self, memtable_size: usize) -> Self {
        self.memtable_size = memtable_size;
        self
    }

    /// Set the shard count for the parallel store.
    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Delete each level directory on open.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Derive the shard config for the given partition: the database name is
    /// suffixed with the partition index so each shard owns its own
    /// directory tree.
    pub fn partition(&self, partition: usize) -> Self {
        let mut config = self.clone();
        config.name = format!("{}_{}", self.name, partition);
        config
    }

    /// Validate the config and expand it into one `LevelConfig` per level,
    /// with geometrically growing thresholds.
    pub fn levels(&self) -> Result<Vec<LevelConfig>> {
        if self.name.is_empty() {
            return errinput!("database name must not be empty");
        }
        if self.num_levels < 2 {
            return errinput!("at least 2 levels required, got {}", self.num_levels);
        }
        if self.base_threshold < 1 {
            return errinput!("base threshold must be at least 1");
        }
        if self.parallelism < 1 {
            return errinput!("parallelism must be at least 1");
        }
        if self.table_size < 16 {
            return errinput!("table size {} cannot hold a record and its index", self.table_size);
        }

        let mut directories: Vec<&str> =
            self.path.split(',').map(str::trim).filter(|d| !d.is_empty()).collect();
        if directories.is_empty() {
            return errinput!("database path must not be empty");
        }
        if directories.len() == 1 {
            let dir = directories[0];
            directories.resize(self.num_levels, dir);
        } else if directories.len() != self.num_levels {
            return errinput!(
                "expected 1 or {} level paths, got {}",
                self.num_levels,
                directories.len()
            );
        }

        let mut levels = Vec::with_capacity(self.num_levels);
        let mut threshold = self.base_threshold;
        for (i, dir) in directories.into_iter().enumerate() {
            levels.push(LevelConfig::new(
                dir,
                &self.name,
                i,
                self.table_size,
                threshold,
                self.overwrite,
            ));
            threshold *= self.base_threshold;
        }
        Ok(levels)
    }
}
