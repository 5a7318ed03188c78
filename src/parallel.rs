use crate::config::Config;
use crate::error::Result;
use crate::hasher::djb2;
use crate::shard::{GetFuture, Shard};

/// A store fanned out over hash-partitioned shards.
///
/// Every key routes to shard `djb2(key) mod parallelism`, so all operations
/// on one key execute on the same worker in enqueue order. There is no
/// ordering between keys on different shards. The front-end owns no threads
/// of its own.
pub struct ParallelKvStore {
    shards: Vec<Shard>,
}

impl ParallelKvStore {
    pub fn open(config: Config) -> Result<Self> {
        // Surface config errors here rather than from the first shard.
        config.levels()?;

        let shards = (0..config.parallelism)
            .map(|partition| Shard::open(&config, partition))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { shards })
    }

    pub fn add(&self, key: &[u8], value: &[u8]) {
        self.shard(key).add(key, value);
    }

    /// Queue a lookup on the key's shard, returning a completion handle.
    pub fn get(&self, key: &[u8]) -> GetFuture {
        self.shard(key).get(key)
    }

    pub fn remove(&self, key: &[u8]) {
        self.shard(key).remove(key);
    }

    /// Queue a destroy on every shard. Runs behind any queued operations;
    /// dropping the store afterwards joins the workers.
    pub fn destroy(&self) {
        for shard in &self.shards {
            shard.destroy();
        }
    }

    fn shard(&self, key: &[u8]) -> &Shard {
        let index = djb2(key) % self.shards.len() as u64;
        &self.shards[index as usize]
    }
}
