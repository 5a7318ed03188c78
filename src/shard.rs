use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::config::Config;
use crate::error::Result;
use crate::store::KvStore;

/// One queued store operation. The worker applies tasks strictly in enqueue
/// order, which serializes all operations on the shard's keys.
enum Task {
    Add(Vec<u8>, Vec<u8>),
    Get(Vec<u8>, Sender<Option<Vec<u8>>>),
    Remove(Vec<u8>),
    Destroy,
    Terminate,
}

/// Completion handle for a queued `get`. `wait` blocks until the shard's
/// worker has executed the lookup.
pub struct GetFuture {
    result: Receiver<Option<Vec<u8>>>,
}

impl GetFuture {
    pub fn wait(self) -> Option<Vec<u8>> {
        self.result.recv().unwrap_or(None)
    }
}

/// A store partition: one [`KvStore`] owned by one worker thread, fed
/// through an unbounded FIFO.
///
/// The worker is pinned to core `partition mod num_cpus`. Dropping the
/// shard enqueues a terminate task behind everything already queued and
/// joins the worker, so pending operations drain before shutdown.
pub struct Shard {
    queue: Sender<Task>,
    worker: Option<JoinHandle<()>>,
}

impl Shard {
    pub fn open(config: &Config, partition: usize) -> Result<Self> {
        let store = KvStore::open(config.partition(partition))?;
        let (queue, tasks) = unbounded();

        let worker = std::thread::Builder::new()
            .name(format!("emberdb-shard-{partition}"))
            .spawn(move || {
                pin_to_core(partition);
                run(store, &tasks);
            })?;

        Ok(Self { queue, worker: Some(worker) })
    }

    pub fn add(&self, key: &[u8], value: &[u8]) {
        self.send(Task::Add(key.to_vec(), value.to_vec()));
    }

    pub fn get(&self, key: &[u8]) -> GetFuture {
        let (sender, result) = bounded(1);
        self.send(Task::Get(key.to_vec(), sender));
        GetFuture { result }
    }

    pub fn remove(&self, key: &[u8]) {
        self.send(Task::Remove(key.to_vec()));
    }

    pub fn destroy(&self) {
        self.send(Task::Destroy);
    }

    fn send(&self, task: Task) {
        // The worker only exits after the terminate task sent on drop, so a
        // failed send means it panicked.
        self.queue.send(task).expect("shard worker is gone");
    }
}

impl Drop for Shard {
    fn drop(&mut self) {
        let _ = self.queue.send(Task::Terminate);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("shard worker panicked");
            }
        }
    }
}

/// Pin the calling thread to a core chosen by partition index.
fn pin_to_core(partition: usize) {
    if let Some(cores) = core_affinity::get_core_ids() {
        if !cores.is_empty() {
            core_affinity::set_for_current(cores[partition % cores.len()]);
        }
    }
}

fn run(mut store: KvStore, tasks: &Receiver<Task>) {
    while let Ok(task) = tasks.recv() {
        match task {
            Task::Add(key, value) => {
                if let Err(e) = store.add(&key, &value) {
                    tracing::error!(error = %e, "failed to apply queued add");
                }
            }
            Task::Get(key, result) => {
                // The caller may have dropped its future; that only means
                // nobody is waiting.
                let _ = result.send(store.get(&key));
            }
            Task::Remove(key) => store.remove(&key),
            Task::Destroy => store.destroy(),
            Task::Terminate => break,
        }
    }
}
