// src/history/memory.rs

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::errors::{Result, WatcherError};
use crate::execution::Wid;
use crate::types::{BoxFuture, ClusterSnapshot};

use super::{HistoryStore, RecordState, WatchRecord};

#[derive(Debug, Default)]
struct State {
    records: BTreeMap<Wid, WatchRecord>,
    /// Every write, in order: (record id, state written).
    writes: Vec<(Wid, RecordState)>,
    rejected_watches: HashSet<String>,
    fail_next_puts: usize,
}

/// History store keeping records in memory.
///
/// Writes are refused while the store is stopped. For tests, puts can be
/// made to fail for specific watch ids or for the next N calls.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistoryStore {
    state: Arc<Mutex<State>>,
    started: Arc<AtomicBool>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate with records left over from a previous process.
    pub fn with_records(records: impl IntoIterator<Item = WatchRecord>) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            for record in records {
                state.records.insert(record.id.clone(), record);
            }
        }
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Refuse every put of a record for `watch_id`.
    pub fn reject_puts_for(&self, watch_id: impl Into<String>) {
        self.lock().rejected_watches.insert(watch_id.into());
    }

    /// Make the next `n` `put`/`put_all` calls fail outright.
    pub fn fail_next_puts(&self, n: usize) {
        self.lock().fail_next_puts = n;
    }

    pub fn get(&self, id: &Wid) -> Option<WatchRecord> {
        self.lock().records.get(id).cloned()
    }

    pub fn records(&self) -> Vec<WatchRecord> {
        self.lock().records.values().cloned().collect()
    }

    pub fn records_for(&self, watch_id: &str) -> Vec<WatchRecord> {
        self.lock()
            .records
            .values()
            .filter(|r| r.watch_id == watch_id)
            .cloned()
            .collect()
    }

    /// States written for `id`, oldest first.
    pub fn writes_for(&self, id: &Wid) -> Vec<RecordState> {
        self.lock()
            .writes
            .iter()
            .filter(|(wid, _)| wid == id)
            .map(|(_, state)| *state)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    fn ensure_started(&self) -> Result<()> {
        if self.started() {
            Ok(())
        } else {
            Err(WatcherError::Store("history store is not started".to_string()))
        }
    }

    fn write(state: &mut State, record: &WatchRecord) {
        state.writes.push((record.id.clone(), record.state));
        state.records.insert(record.id.clone(), record.clone());
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn start(&self) {
        if !self.started.swap(true, Ordering::AcqRel) {
            info!("history store started");
        }
    }

    fn stop(&self) {
        if self.started.swap(false, Ordering::AcqRel) {
            info!("history store stopped");
        }
    }

    fn load_records<'a>(
        &'a self,
        _snapshot: &'a ClusterSnapshot,
        state: RecordState,
    ) -> BoxFuture<'a, Result<Vec<WatchRecord>>> {
        Box::pin(async move {
            let records: Vec<WatchRecord> = self
                .lock()
                .records
                .values()
                .filter(|r| r.state == state)
                .cloned()
                .collect();
            debug!(count = records.len(), %state, "loaded watch records");
            Ok(records)
        })
    }

    fn put<'a>(&'a self, record: &'a WatchRecord) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.ensure_started()?;
            let mut state = self.lock();
            if state.fail_next_puts > 0 {
                state.fail_next_puts -= 1;
                return Err(WatcherError::Store(format!(
                    "failed to store watch record [{}]",
                    record.id
                )));
            }
            if state.rejected_watches.contains(&record.watch_id) {
                return Err(WatcherError::Store(format!(
                    "rejected watch record [{}]",
                    record.id
                )));
            }
            Self::write(&mut state, record);
            Ok(())
        })
    }

    fn put_all<'a>(&'a self, records: &'a [WatchRecord]) -> BoxFuture<'a, Result<Vec<usize>>> {
        Box::pin(async move {
            self.ensure_started()?;
            let mut state = self.lock();
            if state.fail_next_puts > 0 {
                state.fail_next_puts -= 1;
                return Err(WatcherError::Store(format!(
                    "failed to store [{}] watch records",
                    records.len()
                )));
            }
            let mut stored = Vec::with_capacity(records.len());
            for (slot, record) in records.iter().enumerate() {
                if state.rejected_watches.contains(&record.watch_id) {
                    debug!(wid = %record.id, "rejecting watch record");
                    continue;
                }
                Self::write(&mut state, record);
                stored.push(slot);
            }
            Ok(stored)
        })
    }

    fn update<'a>(&'a self, record: &'a WatchRecord) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.ensure_started()?;
            Self::write(&mut self.lock(), record);
            Ok(())
        })
    }
}
