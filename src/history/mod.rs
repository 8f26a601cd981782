// src/history/mod.rs

//! Durable record of every watch execution.
//!
//! A [`WatchRecord`] is written once as `awaits_execution` before the
//! execution is handed to a worker, and overwritten once more when it is
//! sealed. Records still `awaits_execution` at startup are firings that were
//! accepted but never completed; the execution service replays them.

use std::fmt::{self, Debug};

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::execution::result::WatchExecutionResult;
use crate::execution::state::ExecutionState;
use crate::execution::{WatchExecutionContext, Wid};
use crate::trigger::TriggerEvent;
use crate::types::{BoxFuture, ClusterSnapshot, WatchId};

pub mod memory;

pub use memory::InMemoryHistoryStore;

/// Lifecycle state of a history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Durably queued, not yet picked up by a worker.
    AwaitsExecution,
    /// A worker is running the pipeline.
    Checking,
    /// Sealed with a terminal outcome.
    Completed(ExecutionState),
}

impl RecordState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RecordState::Completed(_))
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordState::AwaitsExecution => f.write_str("awaits_execution"),
            RecordState::Checking => f.write_str("checking"),
            RecordState::Completed(state) => write!(f, "{state}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchRecord {
    pub id: Wid,
    pub watch_id: WatchId,
    pub trigger_event: TriggerEvent,
    pub state: RecordState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<WatchExecutionResult>,
}

impl WatchRecord {
    /// A fresh record in the `awaits_execution` state.
    pub fn new(id: Wid, watch_id: impl Into<WatchId>, trigger_event: TriggerEvent) -> Self {
        Self {
            id,
            watch_id: watch_id.into(),
            trigger_event,
            state: RecordState::AwaitsExecution,
            message: None,
            result: None,
        }
    }

    pub fn for_context(ctx: &WatchExecutionContext) -> Self {
        Self::new(
            ctx.id().clone(),
            ctx.watch().id.clone(),
            ctx.trigger_event().clone(),
        )
    }

    /// Terminal outcome, once the record is sealed.
    pub fn execution_state(&self) -> Option<ExecutionState> {
        match self.state {
            RecordState::Completed(state) => Some(state),
            _ => None,
        }
    }

    pub fn update(&mut self, state: RecordState, message: Option<String>) {
        self.state = state;
        self.message = message;
    }

    /// Seal the record with the pipeline result and derive its outcome.
    pub fn seal(&mut self, result: WatchExecutionResult) {
        let state = if !result.condition_met() {
            ExecutionState::ExecutionNotNeeded
        } else if result.all_actions_throttled() {
            ExecutionState::Throttled
        } else {
            ExecutionState::Executed
        };
        self.state = RecordState::Completed(state);
        self.result = Some(result);
    }
}

/// What the execution service needs from the history store.
pub trait HistoryStore: Send + Sync + Debug {
    fn start(&self);

    /// Stop accepting writes once pending ones are flushed.
    fn stop(&self);

    /// Records visible in `snapshot` that are in `state`.
    fn load_records<'a>(
        &'a self,
        snapshot: &'a ClusterSnapshot,
        state: RecordState,
    ) -> BoxFuture<'a, Result<Vec<WatchRecord>>>;

    fn put<'a>(&'a self, record: &'a WatchRecord) -> BoxFuture<'a, Result<()>>;

    /// Store several records; returns the indices (into `records`) that were
    /// durably stored.
    fn put_all<'a>(&'a self, records: &'a [WatchRecord]) -> BoxFuture<'a, Result<Vec<usize>>>;

    fn update<'a>(&'a self, record: &'a WatchRecord) -> BoxFuture<'a, Result<()>>;
}
