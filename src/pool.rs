use std::num::NonZeroUsize;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Submission raced against a capacity change; the caller must compensate
/// (the dispatch loop releases the claimed request back to pending).
#[derive(Debug, Error, PartialEq, Eq)]
#[error("worker pool is saturated")]
pub struct PoolSaturated;

/// Fixed-capacity concurrent executor with no backing queue.
///
/// A permit is taken synchronously on submission and returned when the task
/// finishes, so `free_capacity()` is never observed larger than the true
/// number of idle workers. Submission never blocks; rejection is a normal
/// outcome the dispatch loop avoids by claiming at most `free_capacity()`
/// requests per tick.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity.get())),
            capacity: capacity.get(),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of workers currently idle.
    #[must_use]
    pub fn free_capacity(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `task` on an idle worker, or reject immediately if none is free.
    pub fn try_submit<F>(&self, task: F) -> Result<JoinHandle<()>, PoolSaturated>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|_| PoolSaturated)?;
        Ok(tokio::spawn(async move {
            task.await;
            drop(permit);
        }))
    }
}
