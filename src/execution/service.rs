// src/execution/service.rs

//! The execution service: turns trigger events into sealed history records.
//!
//! The execution of a watch is split in two phases:
//! 1. intake: the pending history record is durably stored;
//! 2. processing: a worker runs the pipeline and seals the record.
//!
//! Even when every worker is busy, the fact that a watch fired is not lost:
//! its `awaits_execution` record is already stored, and [`ExecutionService::start`]
//! replays such records after a restart.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, trace, warn};

use crate::clock::Clock;
use crate::errors::{Result, WatcherError};
use crate::history::{HistoryStore, RecordState, WatchRecord};
use crate::pipeline::{StageError, StageStatus};
use crate::trigger::TriggerEvent;
use crate::types::ClusterSnapshot;
use crate::watch::{ActionWrapper, WatchLockService, WatchStore};

use super::context::WatchExecutionContext;
use super::executor::{ExecutionTask, WatchExecutor};
use super::registry::{CurrentExecutions, WatchExecutionSnapshot};
use super::result::{ActionResult, WatchExecutionResult};
use super::state::ExecutionState;
use super::throttle::throttle;

/// Tunables of the execution service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSettings {
    /// Throttle period applied to actions that configure none; zero
    /// disables period throttling.
    pub default_throttle_period: Duration,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            default_throttle_period: Duration::from_secs(5),
        }
    }
}

/// Cheaply cloneable handle on the execution service.
#[derive(Clone)]
pub struct ExecutionService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    history: Arc<dyn HistoryStore>,
    watches: Arc<dyn WatchStore>,
    executor: Arc<dyn WatchExecutor>,
    locks: WatchLockService,
    clock: Arc<dyn Clock>,
    default_throttle_period: Option<Duration>,
    current: CurrentExecutions,
    started: AtomicBool,
}

impl fmt::Debug for ExecutionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionService")
            .field("started", &self.started())
            .field("default_throttle_period", &self.inner.default_throttle_period)
            .field("queue_size", &self.queue_size())
            .field("running", &self.inner.current.len())
            .finish_non_exhaustive()
    }
}

impl ExecutionService {
    pub fn new(
        settings: ExecutionSettings,
        history: Arc<dyn HistoryStore>,
        watches: Arc<dyn WatchStore>,
        executor: Arc<dyn WatchExecutor>,
        locks: WatchLockService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let period = settings.default_throttle_period;
        Self {
            inner: Arc::new(ServiceInner {
                history,
                watches,
                executor,
                locks,
                clock,
                default_throttle_period: (!period.is_zero()).then_some(period),
                current: CurrentExecutions::new(),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Start the service and replay every record left `awaits_execution`
    /// by a previous process. Calling it again while started is a no-op.
    pub async fn start(&self, snapshot: &ClusterSnapshot) -> Result<()> {
        let inner = &self.inner;
        if inner.started() {
            return Ok(());
        }

        let queued = inner.executor.queue_size();
        debug_assert_eq!(queued, 0, "queue should be empty, but contains {queued} elements");
        if queued != 0 {
            warn!(queued, "executor queue is not empty while starting");
        }

        let records = inner
            .history
            .load_records(snapshot, RecordState::AwaitsExecution)
            .await?;

        if inner
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            debug!("starting execution service");
            inner.history.start();
            inner.execute_records(records).await;
            debug!("started execution service");
        }
        Ok(())
    }

    /// Stop the service. Queued, unstarted executions are dropped; running
    /// ones finish but no longer write history. Idempotent.
    pub fn stop(&self) {
        let inner = &self.inner;
        if inner
            .started
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            debug!("stopping execution service");
            let cancelled = inner.executor.drain_queue();
            inner.history.stop();
            debug!(cancelled = cancelled.len(), "cancelled queued tasks");
            debug!("stopped execution service");
        }
    }

    pub fn started(&self) -> bool {
        self.inner.started()
    }

    pub fn default_throttle_period(&self) -> Option<Duration> {
        self.inner.default_throttle_period
    }

    pub fn queue_size(&self) -> usize {
        self.inner.executor.queue_size()
    }

    pub fn largest_queue_size(&self) -> usize {
        self.inner.executor.largest_pool_size()
    }

    pub fn lock_service(&self) -> &WatchLockService {
        &self.inner.locks
    }

    /// Running executions, longest-running first.
    pub fn current_executions(&self) -> Vec<WatchExecutionSnapshot> {
        self.inner.current.snapshot()
    }

    /// Accept a batch of trigger events.
    ///
    /// Returns as soon as the contexts are built; persisting the pending
    /// records and submitting them happens on a background task.
    pub fn process_events_async(
        &self,
        events: impl IntoIterator<Item = TriggerEvent>,
    ) -> Result<()> {
        let inner = &self.inner;
        if !inner.started() {
            return Err(WatcherError::NotStarted);
        }
        let batch = inner.prepare(events);
        if batch.is_empty() {
            return Ok(());
        }

        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            let count = batch.len();
            if let Err(e) = inner.persist_and_submit(batch).await {
                match e {
                    WatcherError::Rejected(_) => debug!(
                        count,
                        error = %e.detailed_message(),
                        "failed to store watch records due to overloaded executor"
                    ),
                    _ => warn!(count, error = %e.detailed_message(), "failed to store watch records"),
                }
            }
        });
        Ok(())
    }

    /// Like [`Self::process_events_async`], but waits until the pending
    /// records are stored and submitted.
    pub async fn process_events_sync(
        &self,
        events: impl IntoIterator<Item = TriggerEvent>,
    ) -> Result<()> {
        let inner = &self.inner;
        if !inner.started() {
            return Err(WatcherError::NotStarted);
        }
        let batch = inner.prepare(events);
        if batch.is_empty() {
            return Ok(());
        }
        inner.persist_and_submit(batch).await
    }

    /// Run `ctx` on the calling task and return its sealed record.
    ///
    /// Used for manual and test executions. The record (and the watch status)
    /// are only persisted when `ctx.record_execution()` is true.
    pub async fn execute(&self, mut ctx: WatchExecutionContext) -> Result<WatchRecord> {
        let inner = &self.inner;
        let mut record = WatchRecord::for_context(&ctx);

        let mut lock = inner.locks.acquire(&ctx.watch().id).await;
        let outcome = {
            let _registration = inner.current.register(&ctx);
            catch_panic(inner.execute_locked(&mut ctx, &mut record)).await
        };
        lock.release();
        outcome?;

        if ctx.record_execution() {
            inner.history.put(&record).await?;
        }
        Ok(record)
    }

    /// The pipeline body, exposed for callers that manage locking and
    /// recording themselves.
    pub async fn execute_inner(&self, ctx: &mut WatchExecutionContext) -> Result<WatchExecutionResult> {
        self.inner.execute_inner(ctx).await
    }
}

/// Contexts and their pending records, index-aligned.
struct Batch {
    contexts: Vec<WatchExecutionContext>,
    records: Vec<WatchRecord>,
}

impl Batch {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ServiceInner {
    fn started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    fn prepare(&self, events: impl IntoIterator<Item = TriggerEvent>) -> Batch {
        let now = self.clock.now();
        let mut batch = Batch {
            contexts: Vec::new(),
            records: Vec::new(),
        };

        for event in events {
            let Some(watch) = self.watches.get(event.watch_id()) else {
                warn!(
                    watch_id = %event.watch_id(),
                    "unable to find watch in the watch store, perhaps it has been deleted"
                );
                continue;
            };
            let ctx = WatchExecutionContext::triggered(
                watch,
                now,
                event,
                self.default_throttle_period,
            );
            batch.records.push(WatchRecord::for_context(&ctx));
            batch.contexts.push(ctx);
        }

        debug!(count = batch.len(), "saving watch records");
        batch
    }

    /// Store the pending records, then submit exactly the ones that were
    /// durably stored.
    async fn persist_and_submit(self: &Arc<Self>, batch: Batch) -> Result<()> {
        let Batch { contexts, records } = batch;

        if records.len() == 1 {
            self.history.put(&records[0]).await?;
            for (ctx, record) in contexts.into_iter().zip(records) {
                self.execute_async(ctx, record).await;
            }
            return Ok(());
        }

        let stored = self.history.put_all(&records).await?;
        if stored.len() < records.len() {
            warn!(
                stored = stored.len(),
                total = records.len(),
                "only part of the watch records were stored; executing stored ones only"
            );
        }

        let mut slots: Vec<Option<(WatchExecutionContext, WatchRecord)>> =
            contexts.into_iter().zip(records).map(Some).collect();
        for slot in stored {
            match slots.get_mut(slot).and_then(Option::take) {
                Some((ctx, record)) => self.execute_async(ctx, record).await,
                None => warn!(slot, "history store reported an unknown or duplicate slot"),
            }
        }
        Ok(())
    }

    /// Hand an execution to the executor. On rejection the record is sealed
    /// as failed; it is not retried.
    async fn execute_async(self: &Arc<Self>, ctx: WatchExecutionContext, record: WatchRecord) {
        let mut rejected_record = record.clone();
        let inner = Arc::clone(self);
        let task: ExecutionTask = Box::pin(async move { inner.run_task(ctx, record).await });

        if let Err(e) = self.executor.execute(task) {
            debug!(watch_id = %rejected_record.watch_id, error = %e, "failed to execute triggered watch");
            let message = format!(
                "failed to run triggered watch [{}] due to thread pool capacity",
                rejected_record.watch_id
            );
            rejected_record.update(RecordState::Completed(ExecutionState::Failed), Some(message));
            if let Err(e) = self.history.update(&rejected_record).await {
                error!(
                    wid = %rejected_record.id,
                    error = %e.detailed_message(),
                    "failed to update rejected watch record"
                );
            }
        }
    }

    /// Recovery replay of records left `awaits_execution`.
    async fn execute_records(self: &Arc<Self>, records: Vec<WatchRecord>) {
        let mut counter = 0usize;
        for mut record in records {
            match self.watches.get(&record.watch_id) {
                None => {
                    let message = format!(
                        "unable to find watch for record [{}]/[{}], perhaps it has been deleted while queued, ignoring...",
                        record.watch_id, record.id
                    );
                    warn!(wid = %record.id, "{message}");
                    record.update(
                        RecordState::Completed(ExecutionState::NotExecutedWatchMissing),
                        Some(message),
                    );
                    if let Err(e) = self.history.update(&record).await {
                        error!(wid = %record.id, error = %e.detailed_message(), "failed to update watch record");
                    }
                }
                Some(watch) => {
                    let ctx = WatchExecutionContext::triggered(
                        watch,
                        self.clock.now(),
                        record.trigger_event.clone(),
                        self.default_throttle_period,
                    );
                    self.execute_async(ctx, record).await;
                    counter += 1;
                }
            }
        }
        debug!(count = counter, "executed watches from the watch history");
    }

    /// Body of an executor task.
    async fn run_task(self: Arc<Self>, mut ctx: WatchExecutionContext, mut record: WatchRecord) {
        if !self.started() {
            debug!(wid = %record.id, "can't initiate watch execution as execution service is not started, ignoring it...");
            return;
        }
        trace!(watch_id = %record.watch_id, wid = %ctx.id(), "executing");

        let mut lock = self.locks.acquire(&record.watch_id).await;
        let outcome = {
            let _registration = self.current.register(&ctx);
            catch_panic(self.check_and_execute(&mut ctx, &mut record)).await
        };

        if let Err(e) = outcome {
            let detailed = e.detailed_message();
            if self.started() {
                warn!(watch_id = %record.watch_id, wid = %ctx.id(), failure = %detailed, "failed to execute watch");
                record.update(RecordState::Completed(ExecutionState::Failed), Some(detailed));
            } else {
                debug!(wid = %record.id, failure = %detailed, "failed to execute watch after shutdown");
            }
        }
        lock.release();
        trace!(watch_id = %record.watch_id, wid = %ctx.id(), "finished");

        if ctx.record_execution() && self.started() {
            if let Err(e) = self.history.update(&record).await {
                error!(
                    watch_id = %record.watch_id,
                    wid = %ctx.id(),
                    failure = %e.detailed_message(),
                    record_message = ?record.message,
                    "failed to update watch record"
                );
            }
        }
    }

    /// Runs under the watch lock on the async path.
    async fn check_and_execute(
        &self,
        ctx: &mut WatchExecutionContext,
        record: &mut WatchRecord,
    ) -> Result<()> {
        let Some(latest) = self.watches.get(&record.watch_id) else {
            let message = format!(
                "unable to find watch for record [{}], perhaps it has been deleted, ignoring...",
                record.id
            );
            record.update(
                RecordState::Completed(ExecutionState::NotExecutedWatchMissing),
                Some(message),
            );
            return Ok(());
        };

        // Run against the stored definition: earlier executions of the same
        // watch may have updated its status (and version) since intake.
        ctx.refresh_watch(latest);
        record.update(RecordState::Checking, None);
        debug!(watch_id = %record.watch_id, "checking watch");

        let result = self.execute_inner(ctx).await?;
        record.seal(result);

        if ctx.record_execution() {
            match self.watches.update_status(ctx.watch()).await {
                Ok(()) => {}
                Err(WatcherError::VersionConflict { watch_id }) => {
                    warn!(watch_id = %watch_id, wid = %ctx.id(), "watch was modified or deleted during execution; status not updated");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Runs under the watch lock on the manual path.
    async fn execute_locked(
        &self,
        ctx: &mut WatchExecutionContext,
        record: &mut WatchRecord,
    ) -> Result<()> {
        let result = self.execute_inner(ctx).await?;
        record.seal(result);
        if ctx.record_execution() {
            self.watches.update_status(ctx.watch()).await?;
        }
        Ok(())
    }

    async fn execute_inner(&self, ctx: &mut WatchExecutionContext) -> Result<WatchExecutionResult> {
        ctx.before_input();
        if ctx.input_result().is_none() {
            let input = Arc::clone(&ctx.watch().input);
            let result = input.execute(ctx).await?;
            ctx.on_input_result(result);
        }

        ctx.before_condition();
        let met = match ctx.condition_result() {
            Some(result) => result.met,
            None => {
                let condition = Arc::clone(&ctx.watch().condition);
                let result = condition.execute(ctx).await?;
                let met = result.met;
                ctx.on_condition_result(result);
                met
            }
        };

        if met {
            if let Some(transform) = ctx.watch().transform.clone() {
                ctx.before_watch_transform();
                let payload = ctx.payload().clone();
                let result = transform.execute(ctx, &payload).await?;
                if result.status == StageStatus::Failure {
                    let reason = result.reason.clone().unwrap_or_default();
                    ctx.on_watch_transform_result(result);
                    return Err(StageError::new(transform.kind(), reason).into());
                }
                ctx.on_watch_transform_result(result);
            }

            ctx.before_actions();
            let actions: Vec<ActionWrapper> = ctx.watch().actions.clone();
            for wrapper in &actions {
                if ctx.has_action_result(&wrapper.id) {
                    continue;
                }
                let result = execute_action(ctx, wrapper).await;
                ctx.on_action_result(result);
            }
        }

        Ok(ctx.finish())
    }
}

/// Turn a panic inside an execution into [`WatcherError::Panicked`], so the
/// record still gets sealed and the lock is released by the caller.
async fn catch_panic<F>(execution: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    AssertUnwindSafe(execution)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(WatcherError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Resolve one action. Never fails: errors become a `failed` result so that
/// sibling actions still run.
async fn execute_action(ctx: &WatchExecutionContext, wrapper: &ActionWrapper) -> ActionResult {
    let id = wrapper.id.as_str();
    let kind = wrapper.kind();

    if !ctx.skip_throttling(id) {
        if let Some(reason) = throttle(ctx, wrapper) {
            debug!(wid = %ctx.id(), action = %id, %reason, "action throttled");
            return ActionResult::throttled(id, kind, reason);
        }
    }

    let payload = ctx.payload().clone();
    if ctx.simulate_action(id) {
        return match wrapper.action.simulate(id, ctx, &payload).await {
            Ok(output) => ActionResult::simulated(id, kind, output),
            Err(e) => ActionResult::failed(id, kind, e.to_string()),
        };
    }

    match wrapper.action.execute(id, ctx, &payload).await {
        Ok(output) => ActionResult::executed(id, kind, output),
        Err(e) => {
            warn!(wid = %ctx.id(), action = %id, error = %e, "failed to execute action");
            ActionResult::failed(id, kind, e.to_string())
        }
    }
}
