// src/execution/executor.rs

//! Bounded worker pool that runs watch executions.
//!
//! The service talks to a [`WatchExecutor`] instead of spawning tasks itself.
//! This is the backpressure boundary: once the queue is full, new work is
//! rejected immediately rather than buffered without bound or blocking the
//! submitter. Tests can provide their own implementation (e.g. one that
//! always rejects).

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::types::BoxFuture;

/// A unit of work handed to the executor.
pub type ExecutionTask = BoxFuture<'static, ()>;

/// The executor queue is full.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("rejected execution: queue capacity [{capacity}] reached")]
pub struct RejectedExecution {
    pub capacity: usize,
}

pub trait WatchExecutor: Send + Sync {
    /// Queue `task`, or reject it without blocking when the queue is full.
    fn execute(&self, task: ExecutionTask) -> Result<(), RejectedExecution>;

    /// Number of queued tasks that have not started yet.
    fn queue_size(&self) -> usize;

    /// High-water mark of concurrently running tasks.
    fn largest_pool_size(&self) -> usize;

    /// Remove and return every queued task that has not started yet.
    fn drain_queue(&self) -> Vec<ExecutionTask>;
}

struct Shared {
    queue: Mutex<VecDeque<ExecutionTask>>,
    capacity: usize,
    notify: Notify,
    active: AtomicUsize,
    largest: AtomicUsize,
}

impl Shared {
    fn queue(&self) -> std::sync::MutexGuard<'_, VecDeque<ExecutionTask>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Fixed-size pool of Tokio worker tasks over a bounded FIFO queue.
pub struct BoundedExecutor {
    shared: Arc<Shared>,
    pool_size: usize,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl BoundedExecutor {
    /// Spawn `pool_size` workers (at least one) sharing a queue of
    /// `queue_capacity` slots (at least one).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(pool_size: usize, queue_capacity: usize) -> Self {
        let pool_size = pool_size.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            capacity: queue_capacity.max(1),
            notify: Notify::new(),
            active: AtomicUsize::new(0),
            largest: AtomicUsize::new(0),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let workers = (0..pool_size)
            .map(|n| {
                let shared = Arc::clone(&shared);
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(worker_loop(n, shared, shutdown_rx))
            })
            .collect();

        info!(pool_size, queue_capacity = shared.capacity, "watch executor started");

        Self {
            shared,
            pool_size,
            shutdown_tx,
            workers: Mutex::new(workers),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn active_count(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Stop the workers once their current task (if any) finishes.
    /// Queued tasks are left in the queue.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let workers: Vec<_> = {
            let mut guard = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "watch executor worker ended abnormally");
            }
        }
        info!("watch executor stopped");
    }
}

impl fmt::Debug for BoundedExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedExecutor")
            .field("pool_size", &self.pool_size)
            .field("capacity", &self.shared.capacity)
            .field("queued", &self.queue_size())
            .field("active", &self.active_count())
            .finish()
    }
}

impl Drop for BoundedExecutor {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl WatchExecutor for BoundedExecutor {
    fn execute(&self, task: ExecutionTask) -> Result<(), RejectedExecution> {
        {
            let mut queue = self.shared.queue();
            if queue.len() >= self.shared.capacity {
                return Err(RejectedExecution {
                    capacity: self.shared.capacity,
                });
            }
            queue.push_back(task);
        }
        self.shared.notify.notify_one();
        Ok(())
    }

    fn queue_size(&self) -> usize {
        self.shared.queue().len()
    }

    fn largest_pool_size(&self) -> usize {
        self.shared.largest.load(Ordering::Acquire)
    }

    fn drain_queue(&self) -> Vec<ExecutionTask> {
        self.shared.queue().drain(..).collect()
    }
}

async fn worker_loop(n: usize, shared: Arc<Shared>, mut shutdown_rx: watch::Receiver<bool>) {
    debug!(worker = n, "executor worker started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let next = shared.queue().pop_front();
        let Some(task) = next else {
            tokio::select! {
                _ = shared.notify.notified() => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            continue;
        };

        let running = shared.active.fetch_add(1, Ordering::AcqRel) + 1;
        shared.largest.fetch_max(running, Ordering::AcqRel);

        // Run on its own Tokio task so a panicking execution cannot take the
        // worker down with it.
        if let Err(e) = tokio::spawn(task).await {
            error!(worker = n, error = %e, "watch execution task panicked");
        }

        shared.active.fetch_sub(1, Ordering::AcqRel);
    }

    debug!(worker = n, "executor worker finished");
}
