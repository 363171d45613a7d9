//! Fixed-size pool of payment consumers.

use tracing::info;

use paylake_queue::PaymentQueue;

use crate::object_store::{KeyScheme, ObjectStore};

use super::consumer::{Consumer, ConsumerHandle, WorkerConfig, WorkerStats};

/// A set of identically configured consumers draining the same queue.
///
/// Concurrency is horizontal: each worker runs the single-threaded consumer
/// loop, and the queue's visibility leases keep two workers from processing
/// the same delivery at once.
pub struct WorkerPool {
    handles: Vec<ConsumerHandle>,
}

impl WorkerPool {
    /// Spawn `workers` consumers named `<name>-0` through `<name>-{N-1}`.
    pub fn spawn<Q, S>(
        queue: Q,
        store: S,
        keys: KeyScheme,
        config: WorkerConfig,
        workers: usize,
    ) -> Self
    where
        Q: PaymentQueue + Clone + 'static,
        S: ObjectStore + Clone + 'static,
    {
        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let worker_config = config.clone().with_name(format!("{}-{i}", config.name));
            let consumer = Consumer::new(queue.clone(), store.clone(), keys.clone());
            handles.push(consumer.spawn(worker_config));
        }
        info!(workers, "worker pool started");
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Aggregate statistics across all workers.
    pub fn stats(&self) -> WorkerStats {
        let mut total = WorkerStats::default();
        for handle in &self.handles {
            let s = handle.stats();
            total.leased += s.leased;
            total.written += s.written;
            total.acked += s.acked;
            total.malformed += s.malformed;
            total.store_failures += s.store_failures;
            total.ack_failures += s.ack_failures;
        }
        total
    }

    /// Shut down all workers and wait for each to stop.
    pub fn shutdown(self) {
        for handle in self.handles {
            handle.shutdown();
        }
        info!("worker pool stopped");
    }
}
