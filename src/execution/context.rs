// src/execution/context.rs

//! Per-execution pipeline state.
//!
//! A [`WatchExecutionContext`] is created for every firing of a watch, is
//! mutated only by the worker running it (and the submitter before work
//! begins), and is consumed when its result seals a history record.
//!
//! Two variants exist, see [`ContextKind`]:
//! - `Triggered`: fired by the trigger detector. Never simulates, never
//!   skips throttling, always recorded.
//! - `Manual`: requested by an operator or a test, with per-action
//!   [`ActionExecutionMode`]s and caller-controlled recording.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{trace, warn};

use crate::errors::{Result, WatcherError};
use crate::pipeline::{ConditionResult, InputResult, TransformResult};
use crate::trigger::TriggerEvent;
use crate::types::Payload;
use crate::watch::Watch;

use super::result::{ActionResult, WatchExecutionResult};
use super::state::{ALL_ACTIONS, ActionExecutionMode, ExecutionPhase};
use super::wid::Wid;

static NULL_PAYLOAD: Payload = Payload::Null;

/// Live view of an execution's progress, shared with the registry so that
/// operators can see where a running execution currently is.
#[derive(Debug, Default)]
pub struct ExecutionProgress {
    phase: AtomicU8,
    resolved_actions: Mutex<Vec<String>>,
}

impl ExecutionProgress {
    pub fn phase(&self) -> ExecutionPhase {
        ExecutionPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Action ids that already have a result, in resolution order.
    pub fn resolved_actions(&self) -> Vec<String> {
        self.resolved_actions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_phase(&self, phase: ExecutionPhase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }

    fn push_action(&self, id: &str) {
        self.resolved_actions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(id.to_string());
    }
}

/// Options of a manually requested execution.
#[derive(Debug, Clone, Default)]
pub struct ManualOptions {
    /// `action id | "_all"` → mode.
    pub action_modes: HashMap<String, ActionExecutionMode>,
    /// Whether the result is written to the history and watch stores.
    pub record_execution: bool,
    /// Treat the condition as met without evaluating it.
    pub ignore_condition: bool,
    /// Use this payload instead of running the watch input.
    pub alternative_input: Option<Payload>,
}

impl ManualOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action_mode(mut self, action_id: impl Into<String>, mode: ActionExecutionMode) -> Self {
        self.action_modes.insert(action_id.into(), mode);
        self
    }

    pub fn record_execution(mut self, record: bool) -> Self {
        self.record_execution = record;
        self
    }

    pub fn ignore_condition(mut self, ignore: bool) -> Self {
        self.ignore_condition = ignore;
        self
    }

    pub fn alternative_input(mut self, payload: Payload) -> Self {
        self.alternative_input = Some(payload);
        self
    }
}

#[derive(Debug, Clone)]
pub enum ContextKind {
    Triggered,
    Manual(ManualOptions),
}

#[derive(Debug)]
pub struct WatchExecutionContext {
    id: Wid,
    watch: Watch,
    trigger_event: TriggerEvent,
    execution_time: DateTime<Utc>,
    default_throttle_period: Option<Duration>,
    kind: ContextKind,
    progress: Arc<ExecutionProgress>,
    input_result: Option<InputResult>,
    condition_result: Option<ConditionResult>,
    transform_result: Option<TransformResult>,
    action_results: Vec<ActionResult>,
}

impl WatchExecutionContext {
    fn base(
        watch: Watch,
        execution_time: DateTime<Utc>,
        trigger_event: TriggerEvent,
        default_throttle_period: Option<Duration>,
        kind: ContextKind,
    ) -> Self {
        Self {
            id: Wid::new(watch.id.clone(), watch.next_nonce(), execution_time),
            watch,
            trigger_event,
            execution_time,
            default_throttle_period,
            kind,
            progress: Arc::new(ExecutionProgress::default()),
            input_result: None,
            condition_result: None,
            transform_result: None,
            action_results: Vec::new(),
        }
    }

    /// Context for a firing delivered by the trigger detector.
    pub fn triggered(
        watch: Watch,
        execution_time: DateTime<Utc>,
        trigger_event: TriggerEvent,
        default_throttle_period: Option<Duration>,
    ) -> Self {
        Self::base(
            watch,
            execution_time,
            trigger_event,
            default_throttle_period,
            ContextKind::Triggered,
        )
    }

    /// Context for a manual execution.
    ///
    /// Every explicitly named action must exist on the watch. Actions whose
    /// resolved mode is [`ActionExecutionMode::Skip`] get a `throttled`
    /// result right away, so the pipeline never invokes them.
    pub fn manual(
        watch: Watch,
        execution_time: DateTime<Utc>,
        trigger_event: TriggerEvent,
        default_throttle_period: Option<Duration>,
        options: ManualOptions,
    ) -> Result<Self> {
        for action_id in options.action_modes.keys() {
            if action_id != ALL_ACTIONS && watch.action(action_id).is_none() {
                return Err(WatcherError::InvalidRequest(format!(
                    "watch [{}] has no action [{}]",
                    watch.id, action_id
                )));
            }
        }

        let skipped: Vec<(String, String)> = watch
            .actions
            .iter()
            .filter(|a| {
                ActionExecutionMode::resolve(&options.action_modes, &a.id)
                    == Some(ActionExecutionMode::Skip)
            })
            .map(|a| (a.id.clone(), a.kind().to_string()))
            .collect();

        let alternative_input = options.alternative_input.clone();
        let ignore_condition = options.ignore_condition;

        let mut ctx = Self::base(
            watch,
            execution_time,
            trigger_event,
            default_throttle_period,
            ContextKind::Manual(options),
        );

        if let Some(payload) = alternative_input {
            ctx.input_result = Some(InputResult::success("alternative", payload));
        }
        if ignore_condition {
            ctx.condition_result = Some(ConditionResult::new("always", true));
        }
        for (id, kind) in skipped {
            ctx.push_action_result(ActionResult::throttled(
                id,
                kind,
                "manually skipped",
            ));
        }
        Ok(ctx)
    }

    pub fn id(&self) -> &Wid {
        &self.id
    }

    pub fn watch(&self) -> &Watch {
        &self.watch
    }

    pub fn watch_mut(&mut self) -> &mut Watch {
        &mut self.watch
    }

    /// Swap in the latest stored definition of the watch, keeping the id.
    pub(crate) fn refresh_watch(&mut self, watch: Watch) {
        self.watch = watch;
    }

    pub fn trigger_event(&self) -> &TriggerEvent {
        &self.trigger_event
    }

    pub fn execution_time(&self) -> DateTime<Utc> {
        self.execution_time
    }

    pub fn default_throttle_period(&self) -> Option<Duration> {
        self.default_throttle_period
    }

    pub fn kind(&self) -> &ContextKind {
        &self.kind
    }

    pub fn phase(&self) -> ExecutionPhase {
        self.progress.phase()
    }

    pub fn progress(&self) -> Arc<ExecutionProgress> {
        Arc::clone(&self.progress)
    }

    /// Whether `action_id` should run in simulation mode.
    pub fn simulate_action(&self, action_id: &str) -> bool {
        match &self.kind {
            ContextKind::Triggered => false,
            ContextKind::Manual(opts) => {
                ActionExecutionMode::resolve(&opts.action_modes, action_id)
                    .is_some_and(|m| m.simulate())
            }
        }
    }

    /// Whether `action_id` bypasses throttling.
    pub fn skip_throttling(&self, action_id: &str) -> bool {
        match &self.kind {
            ContextKind::Triggered => false,
            ContextKind::Manual(opts) => {
                ActionExecutionMode::resolve(&opts.action_modes, action_id)
                    .is_some_and(|m| m.force())
            }
        }
    }

    pub fn record_execution(&self) -> bool {
        match &self.kind {
            ContextKind::Triggered => true,
            ContextKind::Manual(opts) => opts.record_execution,
        }
    }

    pub fn input_result(&self) -> Option<&InputResult> {
        self.input_result.as_ref()
    }

    pub fn condition_result(&self) -> Option<&ConditionResult> {
        self.condition_result.as_ref()
    }

    pub fn transform_result(&self) -> Option<&TransformResult> {
        self.transform_result.as_ref()
    }

    pub fn action_results(&self) -> &[ActionResult] {
        &self.action_results
    }

    pub fn has_action_result(&self, action_id: &str) -> bool {
        self.action_results.iter().any(|r| r.id == action_id)
    }

    /// Payload actions (and the condition) see: the transformed payload if a
    /// watch transform ran, otherwise the input payload.
    pub fn payload(&self) -> &Payload {
        if let Some(t) = &self.transform_result {
            return &t.payload;
        }
        self.input_result
            .as_ref()
            .map_or(&NULL_PAYLOAD, |r| &r.payload)
    }

    fn advance(&mut self, to: ExecutionPhase) {
        let current = self.progress.phase();
        debug_assert!(
            to > current,
            "phase must move forward: {current} -> {to}"
        );
        if to <= current {
            warn!(wid = %self.id, from = %current, to = %to, "ignoring backwards phase transition");
            return;
        }
        trace!(wid = %self.id, from = %current, to = %to, "execution phase");
        self.progress.set_phase(to);
    }

    pub fn before_input(&mut self) {
        self.advance(ExecutionPhase::Input);
    }

    pub fn on_input_result(&mut self, result: InputResult) {
        self.input_result = Some(result);
    }

    pub fn before_condition(&mut self) {
        self.advance(ExecutionPhase::Condition);
    }

    pub fn on_condition_result(&mut self, result: ConditionResult) {
        self.watch.status.on_check(result.met, self.execution_time);
        self.condition_result = Some(result);
    }

    pub fn before_watch_transform(&mut self) {
        self.advance(ExecutionPhase::WatchTransform);
    }

    pub fn on_watch_transform_result(&mut self, result: TransformResult) {
        self.transform_result = Some(result);
    }

    pub fn before_actions(&mut self) {
        self.advance(ExecutionPhase::Actions);
    }

    /// Record an action result. A second result for the same id is dropped.
    pub fn on_action_result(&mut self, result: ActionResult) {
        if self.has_action_result(&result.id) {
            warn!(wid = %self.id, action = %result.id, "action already resolved; dropping duplicate result");
            return;
        }
        self.watch
            .status
            .on_action_result(&result, self.execution_time);
        self.push_action_result(result);
    }

    fn push_action_result(&mut self, result: ActionResult) {
        self.progress.push_action(&result.id);
        self.action_results.push(result);
    }

    /// Move to `Finished` and assemble the result.
    ///
    /// Action results come out in the watch's configured order, whatever
    /// order they were resolved in (manually skipped actions are resolved at
    /// construction time). A context whose condition was not met carries no
    /// action results.
    pub fn finish(&mut self) -> WatchExecutionResult {
        self.advance(ExecutionPhase::Finished);

        let met = self.condition_result.as_ref().is_some_and(|c| c.met);
        let mut actions = Vec::with_capacity(self.action_results.len());
        for wrapper in self.watch.actions.iter().filter(|_| met) {
            if let Some(result) = self.action_results.iter().find(|r| r.id == wrapper.id) {
                actions.push(result.clone());
            }
        }

        WatchExecutionResult {
            execution_time: self.execution_time,
            input: self.input_result.clone(),
            condition: self.condition_result.clone(),
            transform: self.transform_result.clone(),
            actions,
        }
    }
}
