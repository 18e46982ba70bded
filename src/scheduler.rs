//! Local worker cluster for chunk evaluation.
//!
//! The cluster is created once before benchmarking, queried for its size to
//! fill run metadata, hosts the whole run through [`LocalCluster::install`],
//! and is closed once at the end. The orchestration core never issues
//! concurrent work against it.

use std::collections::BTreeMap;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::error::{ConfigError, Result};

/// Upper bound on the number of workers a default cluster starts.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// A set of workers sharing one dedicated thread pool.
pub struct LocalCluster {
    pool: ThreadPool,
    threads_per_worker: Vec<usize>,
}

impl LocalCluster {
    /// Start a cluster sized to the machine: up to
    /// [`DEFAULT_MAX_WORKERS`] workers splitting the available cores.
    pub fn new() -> Result<Self> {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let workers = cores.min(DEFAULT_MAX_WORKERS);
        Self::with_workers(workers, cores.div_ceil(workers))
    }

    /// Start `workers` workers with `threads_per_worker` threads each.
    pub fn with_workers(workers: usize, threads_per_worker: usize) -> Result<Self> {
        if workers == 0 || threads_per_worker == 0 {
            return Err(ConfigError::Invalid(
                "a cluster needs at least one worker with one thread".to_string(),
            )
            .into());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers * threads_per_worker)
            .thread_name(move |i| {
                format!(
                    "chunkbench-worker-{}-{}",
                    i / threads_per_worker,
                    i % threads_per_worker
                )
            })
            .build()?;

        debug!(workers, threads_per_worker, "started local cluster");
        Ok(Self {
            pool,
            threads_per_worker: vec![threads_per_worker; workers],
        })
    }

    /// Thread count of each worker, keyed by worker name.
    pub fn nthreads(&self) -> BTreeMap<String, usize> {
        self.threads_per_worker
            .iter()
            .enumerate()
            .map(|(i, &t)| (format!("worker-{}", i), t))
            .collect()
    }

    /// Run `op` with chunk evaluation scheduled on this cluster.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    /// Shut the cluster down.
    pub fn close(self) {
        debug!(workers = self.threads_per_worker.len(), "closing local cluster");
        drop(self.pool);
    }
}
