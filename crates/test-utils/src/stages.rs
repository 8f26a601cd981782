//! Pipeline stage doubles.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::Semaphore;
use watcher::execution::WatchExecutionContext;
use watcher::pipeline::{Action, Condition, ConditionResult, Input, InputResult, StageError};
use watcher::types::{BoxFuture, Payload};

/// Action that counts invocations and remembers the executions it ran in.
#[derive(Debug, Clone, Default)]
pub struct RecordingAction {
    executed: Arc<AtomicUsize>,
    simulated: Arc<AtomicUsize>,
    wids: Arc<Mutex<Vec<String>>>,
}

impl RecordingAction {
    pub const KIND: &'static str = "recording";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    pub fn simulated(&self) -> usize {
        self.simulated.load(Ordering::SeqCst)
    }

    /// Ids of the executions that really ran this action, in order.
    pub fn wids(&self) -> Vec<String> {
        self.wids.lock().unwrap().clone()
    }
}

impl Action for RecordingAction {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn execute<'a>(
        &'a self,
        _action_id: &'a str,
        ctx: &'a WatchExecutionContext,
        payload: &'a Payload,
    ) -> BoxFuture<'a, Result<Payload, StageError>> {
        Box::pin(async move {
            let n = self.executed.fetch_add(1, Ordering::SeqCst) + 1;
            self.wids.lock().unwrap().push(ctx.id().to_string());
            Ok(json!({ "count": n, "payload": payload }))
        })
    }

    fn simulate<'a>(
        &'a self,
        _action_id: &'a str,
        _ctx: &'a WatchExecutionContext,
        _payload: &'a Payload,
    ) -> BoxFuture<'a, Result<Payload, StageError>> {
        Box::pin(async move {
            let n = self.simulated.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({ "simulated": n }))
        })
    }
}

/// Action that always errors.
#[derive(Debug, Clone)]
pub struct FailingAction {
    message: String,
}

impl FailingAction {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Action for FailingAction {
    fn kind(&self) -> &str {
        "failing"
    }

    fn execute<'a>(
        &'a self,
        _action_id: &'a str,
        _ctx: &'a WatchExecutionContext,
        _payload: &'a Payload,
    ) -> BoxFuture<'a, Result<Payload, StageError>> {
        Box::pin(async move { Err(StageError::new("failing", self.message.clone())) })
    }
}

/// Action that parks until [`GatedAction::release`] hands it a permit.
///
/// Useful to keep a worker (and the watch lock) busy for as long as a test
/// needs.
#[derive(Debug, Clone)]
pub struct GatedAction {
    gate: Arc<Semaphore>,
    started: Arc<AtomicUsize>,
}

impl Default for GatedAction {
    fn default() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            started: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl GatedAction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `n` blocked (or future) invocations through.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Invocations that reached the gate.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

impl Action for GatedAction {
    fn kind(&self) -> &str {
        "gated"
    }

    fn execute<'a>(
        &'a self,
        _action_id: &'a str,
        _ctx: &'a WatchExecutionContext,
        _payload: &'a Payload,
    ) -> BoxFuture<'a, Result<Payload, StageError>> {
        Box::pin(async move {
            self.started.fetch_add(1, Ordering::SeqCst);
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| StageError::new("gated", e.to_string()))?;
            permit.forget();
            Ok(Payload::Null)
        })
    }
}

/// Input that records how many executions run it at the same time.
#[derive(Debug, Clone)]
pub struct OverlapInput {
    current: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
    runs: Arc<AtomicUsize>,
    hold: Duration,
}

impl OverlapInput {
    pub fn new(hold: Duration) -> Self {
        Self {
            current: Arc::new(AtomicUsize::new(0)),
            max: Arc::new(AtomicUsize::new(0)),
            runs: Arc::new(AtomicUsize::new(0)),
            hold,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl Input for OverlapInput {
    fn kind(&self) -> &str {
        "overlap"
    }

    fn execute<'a>(
        &'a self,
        _ctx: &'a WatchExecutionContext,
    ) -> BoxFuture<'a, Result<InputResult, StageError>> {
        Box::pin(async move {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.hold).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(InputResult::success("overlap", json!({ "overlap": true })))
        })
    }
}

/// Input that errors, failing the whole execution.
#[derive(Debug, Clone)]
pub struct FailingInput {
    message: String,
}

impl FailingInput {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Input for FailingInput {
    fn kind(&self) -> &str {
        "failing"
    }

    fn execute<'a>(
        &'a self,
        _ctx: &'a WatchExecutionContext,
    ) -> BoxFuture<'a, Result<InputResult, StageError>> {
        Box::pin(async move { Err(StageError::new("failing", self.message.clone())) })
    }
}

/// Input that panics instead of returning.
#[derive(Debug, Clone)]
pub struct PanickingInput {
    message: &'static str,
}

impl PanickingInput {
    pub fn new(message: &'static str) -> Self {
        Self { message }
    }
}

impl Input for PanickingInput {
    fn kind(&self) -> &str {
        "panicking"
    }

    fn execute<'a>(
        &'a self,
        _ctx: &'a WatchExecutionContext,
    ) -> BoxFuture<'a, Result<InputResult, StageError>> {
        Box::pin(async move {
            if !self.message.is_empty() {
                panic!("{}", self.message);
            }
            Ok(InputResult::success("panicking", Payload::Null))
        })
    }
}

/// Condition whose outcome the test flips between executions.
#[derive(Debug, Clone)]
pub struct ToggleCondition {
    met: Arc<AtomicBool>,
}

impl ToggleCondition {
    pub fn new(met: bool) -> Self {
        Self {
            met: Arc::new(AtomicBool::new(met)),
        }
    }

    pub fn set(&self, met: bool) {
        self.met.store(met, Ordering::SeqCst);
    }
}

impl Condition for ToggleCondition {
    fn kind(&self) -> &str {
        "toggle"
    }

    fn execute<'a>(
        &'a self,
        _ctx: &'a WatchExecutionContext,
    ) -> BoxFuture<'a, Result<ConditionResult, StageError>> {
        Box::pin(async move { Ok(ConditionResult::new("toggle", self.met.load(Ordering::SeqCst))) })
    }
}
