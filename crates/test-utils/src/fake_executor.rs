use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use watcher::execution::{ExecutionTask, RejectedExecution, WatchExecutor};

/// An executor whose queue is always full.
#[derive(Debug, Default)]
pub struct RejectingExecutor {
    rejected: AtomicUsize,
}

impl RejectingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }
}

impl WatchExecutor for RejectingExecutor {
    fn execute(&self, _task: ExecutionTask) -> Result<(), RejectedExecution> {
        self.rejected.fetch_add(1, Ordering::SeqCst);
        Err(RejectedExecution { capacity: 0 })
    }

    fn queue_size(&self) -> usize {
        0
    }

    fn largest_pool_size(&self) -> usize {
        0
    }

    fn drain_queue(&self) -> Vec<ExecutionTask> {
        Vec::new()
    }
}

/// An executor that only queues; tests decide when tasks run.
#[derive(Default)]
pub struct ManualExecutor {
    queue: Mutex<VecDeque<ExecutionTask>>,
    ran: AtomicUsize,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every queued task to completion, one after the other, on the
    /// calling task. Returns how many ran.
    pub async fn run_all(&self) -> usize {
        let mut count = 0;
        loop {
            let next = self.queue.lock().unwrap().pop_front();
            let Some(task) = next else {
                break;
            };
            task.await;
            count += 1;
        }
        self.ran.fetch_add(count, Ordering::SeqCst);
        count
    }

    pub fn ran(&self) -> usize {
        self.ran.load(Ordering::SeqCst)
    }
}

impl WatchExecutor for ManualExecutor {
    fn execute(&self, task: ExecutionTask) -> Result<(), RejectedExecution> {
        self.queue.lock().unwrap().push_back(task);
        Ok(())
    }

    fn queue_size(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    fn largest_pool_size(&self) -> usize {
        1
    }

    fn drain_queue(&self) -> Vec<ExecutionTask> {
        self.queue.lock().unwrap().drain(..).collect()
    }
}
