pub mod config;
pub mod error;
pub mod hasher;
pub mod level;
pub mod memtable;
pub mod mmap;
pub mod parallel;
pub mod shard;
pub mod sstable;
pub mod store;
pub mod tree;

#[cfg(test)]
pub mod testutil;

pub use config::Config;
pub use error::{Error, Result};
pub use memtable::Memtable;
pub use parallel::ParallelKvStore;
pub use shard::GetFuture;
pub use store::KvStore;
pub use tree::LsmTree;
