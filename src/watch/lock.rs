// src/watch/lock.rs

//! Per-watch mutual exclusion.
//!
//! At most one execution of a given watch id proceeds at any instant, so
//! status updates and history writes for one watch never interleave.
//! Unrelated watch ids never contend.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

type LockTable = HashMap<String, Arc<AsyncMutex<()>>>;

#[derive(Debug, Clone, Default)]
pub struct WatchLockService {
    locks: Arc<Mutex<LockTable>>,
}

impl WatchLockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other holder exists for `watch_id`, then take the lock.
    ///
    /// The returned handle releases on [`WatchLock::release`] or on drop,
    /// whichever comes first.
    pub async fn acquire(&self, watch_id: &str) -> WatchLock {
        let mutex = {
            let mut table = self.table();
            Arc::clone(table.entry(watch_id.to_string()).or_default())
        };

        trace!(watch_id = %watch_id, "acquiring watch lock");
        let guard = mutex.lock_owned().await;
        trace!(watch_id = %watch_id, "acquired watch lock");

        WatchLock {
            watch_id: watch_id.to_string(),
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Whether some execution currently holds the lock for `watch_id`.
    pub fn is_locked(&self, watch_id: &str) -> bool {
        self.table()
            .get(watch_id)
            .is_some_and(|m| m.try_lock().is_err())
    }

    /// Number of watch ids with a lock held or awaited.
    pub fn held(&self) -> usize {
        self.table().len()
    }

    fn table(&self) -> std::sync::MutexGuard<'_, LockTable> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Scoped handle on one watch's lock.
pub struct WatchLock {
    watch_id: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<Mutex<LockTable>>,
}

impl WatchLock {
    pub fn watch_id(&self) -> &str {
        &self.watch_id
    }

    pub fn is_held(&self) -> bool {
        self.guard.is_some()
    }

    /// Release the lock. Calling this more than once is a no-op.
    pub fn release(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        drop(guard);

        // Drop the table entry once nobody holds or waits on it. Waiters
        // clone the Arc under the table mutex, so the count is stable here.
        let mut table = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mutex) = table.get(&self.watch_id) {
            if Arc::strong_count(mutex) == 1 {
                table.remove(&self.watch_id);
            }
        }
        trace!(watch_id = %self.watch_id, "released watch lock");
    }
}

impl Drop for WatchLock {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for WatchLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchLock")
            .field("watch_id", &self.watch_id)
            .field("held", &self.guard.is_some())
            .finish()
    }
}
