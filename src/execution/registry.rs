// src/execution/registry.rs

//! Registry of executions currently running, for diagnostics.
//!
//! There is no per-execution timeout, so a stuck stage blocks its worker
//! forever; this registry is how operators find it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::trigger::TriggerEvent;
use crate::types::WatchId;

use super::context::{ExecutionProgress, WatchExecutionContext};
use super::state::ExecutionPhase;
use super::wid::Wid;

#[derive(Debug)]
struct WatchExecution {
    wid: Wid,
    trigger_event: TriggerEvent,
    execution_time: DateTime<Utc>,
    started: Instant,
    worker: String,
    progress: Arc<ExecutionProgress>,
}

/// Point-in-time view of one running execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchExecutionSnapshot {
    pub wid: Wid,
    pub watch_id: WatchId,
    pub triggered_time: DateTime<Utc>,
    pub execution_time: DateTime<Utc>,
    pub phase: ExecutionPhase,
    /// Actions already resolved; a stuck execution is blocked on the next one.
    pub resolved_actions: Vec<String>,
    /// Thread the execution was registered from.
    pub worker: String,
    pub running_for_ms: u64,
}

#[derive(Debug, Default)]
pub struct CurrentExecutions {
    executions: Mutex<HashMap<WatchId, WatchExecution>>,
}

impl CurrentExecutions {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<WatchId, WatchExecution>> {
        self.executions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `ctx` as running on the current thread. The entry is removed
    /// when the returned guard is dropped.
    pub fn register(&self, ctx: &WatchExecutionContext) -> Registration<'_> {
        let thread = std::thread::current();
        let worker = format!("{}/{:?}", thread.name().unwrap_or("unnamed"), thread.id());
        let watch_id = ctx.watch().id.clone();

        self.map().insert(
            watch_id.clone(),
            WatchExecution {
                wid: ctx.id().clone(),
                trigger_event: ctx.trigger_event().clone(),
                execution_time: ctx.execution_time(),
                started: Instant::now(),
                worker,
                progress: ctx.progress(),
            },
        );

        Registration {
            registry: self,
            watch_id,
        }
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    pub fn contains(&self, watch_id: &str) -> bool {
        self.map().contains_key(watch_id)
    }

    /// Snapshot of every running execution, longest-running first.
    pub fn snapshot(&self) -> Vec<WatchExecutionSnapshot> {
        let mut snapshots: Vec<WatchExecutionSnapshot> = self
            .map()
            .iter()
            .map(|(watch_id, exec)| WatchExecutionSnapshot {
                wid: exec.wid.clone(),
                watch_id: watch_id.clone(),
                triggered_time: exec.trigger_event.triggered_time,
                execution_time: exec.execution_time,
                phase: exec.progress.phase(),
                resolved_actions: exec.progress.resolved_actions(),
                worker: exec.worker.clone(),
                running_for_ms: u64::try_from(exec.started.elapsed().as_millis())
                    .unwrap_or(u64::MAX),
            })
            .collect();

        snapshots.sort_by(|a, b| {
            a.execution_time
                .cmp(&b.execution_time)
                .then_with(|| b.running_for_ms.cmp(&a.running_for_ms))
        });
        snapshots
    }
}

/// Scoped registration; deregisters on drop.
#[derive(Debug)]
pub struct Registration<'a> {
    registry: &'a CurrentExecutions,
    watch_id: WatchId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.map().remove(&self.watch_id);
    }
}
