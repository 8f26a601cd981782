#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use watcher::clock::{Clock, ManualClock};
use watcher::errors::Result;
use watcher::execution::{
    BoundedExecutor, ExecutionService, ExecutionSettings, ManualOptions, WatchExecutionContext,
    WatchExecutor,
};
use watcher::history::{InMemoryHistoryStore, WatchRecord};
use watcher::pipeline::{
    Action, AlwaysCondition, Condition, Input, NeverCondition, SimpleInput, Transform,
};
use watcher::trigger::TriggerEvent;
use watcher::types::{ClusterSnapshot, Payload};
use watcher::watch::{ActionWrapper, InMemoryWatchStore, Watch, WatchLockService};

/// Builder for `Watch` to simplify test setup.
pub struct WatchBuilder {
    id: String,
    input: Arc<dyn Input>,
    condition: Arc<dyn Condition>,
    transform: Option<Arc<dyn Transform>>,
    actions: Vec<ActionWrapper>,
    throttle_period: Option<Duration>,
}

impl WatchBuilder {
    /// A watch whose condition is always met and whose input is `null`.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            input: Arc::new(SimpleInput::new(Payload::Null)),
            condition: Arc::new(AlwaysCondition),
            transform: None,
            actions: Vec::new(),
            throttle_period: None,
        }
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.input = Arc::new(SimpleInput::new(payload));
        self
    }

    pub fn input(mut self, input: impl Input + 'static) -> Self {
        self.input = Arc::new(input);
        self
    }

    pub fn condition_met(mut self, met: bool) -> Self {
        self.condition = if met {
            Arc::new(AlwaysCondition)
        } else {
            Arc::new(NeverCondition)
        };
        self
    }

    pub fn condition(mut self, condition: impl Condition + 'static) -> Self {
        self.condition = Arc::new(condition);
        self
    }

    pub fn transform(mut self, transform: impl Transform + 'static) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn action(mut self, id: &str, action: impl Action + 'static) -> Self {
        self.actions.push(ActionWrapper::new(id, Arc::new(action)));
        self
    }

    pub fn throttled_action(mut self, id: &str, action: impl Action + 'static, period: Duration) -> Self {
        self.actions
            .push(ActionWrapper::new(id, Arc::new(action)).with_throttle_period(period));
        self
    }

    pub fn throttle_period(mut self, period: Duration) -> Self {
        self.throttle_period = Some(period);
        self
    }

    pub fn build(self) -> Watch {
        let mut watch = Watch::new(self.id, self.input, self.condition);
        if let Some(transform) = self.transform {
            watch = watch.with_transform(transform);
        }
        if let Some(period) = self.throttle_period {
            watch = watch.with_throttle_period(period);
        }
        for action in self.actions {
            watch = watch.with_action(action);
        }
        watch
    }
}

/// A fixed, millisecond-aligned start time for the manual clock.
pub fn start_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Everything a service test needs, wired with in-memory stores and a
/// manual clock.
pub struct Harness {
    pub service: ExecutionService,
    pub history: Arc<InMemoryHistoryStore>,
    pub watches: Arc<InMemoryWatchStore>,
    pub executor: Arc<dyn WatchExecutor>,
    pub clock: Arc<ManualClock>,
    pub locks: WatchLockService,
}

/// Builder for `Harness`.
pub struct HarnessBuilder {
    settings: ExecutionSettings,
    executor: Option<Arc<dyn WatchExecutor>>,
    history: InMemoryHistoryStore,
    pool_size: usize,
    queue_capacity: usize,
}

impl HarnessBuilder {
    /// Defaults: no period throttling, 4 workers, 100 queue slots.
    pub fn new() -> Self {
        Self {
            settings: ExecutionSettings {
                default_throttle_period: Duration::ZERO,
            },
            executor: None,
            history: InMemoryHistoryStore::new(),
            pool_size: 4,
            queue_capacity: 100,
        }
    }

    pub fn default_throttle_period(mut self, period: Duration) -> Self {
        self.settings.default_throttle_period = period;
        self
    }

    pub fn executor(mut self, executor: Arc<dyn WatchExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn history(mut self, history: InMemoryHistoryStore) -> Self {
        self.history = history;
        self
    }

    pub fn pool(mut self, pool_size: usize, queue_capacity: usize) -> Self {
        self.pool_size = pool_size;
        self.queue_capacity = queue_capacity;
        self
    }

    /// Must be called from within a Tokio runtime when no executor was set.
    pub fn build(self) -> Harness {
        let history = Arc::new(self.history);
        let watches = Arc::new(InMemoryWatchStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let locks = WatchLockService::new();
        let executor = self.executor.unwrap_or_else(|| {
            Arc::new(BoundedExecutor::new(self.pool_size, self.queue_capacity))
        });

        let service = ExecutionService::new(
            self.settings,
            history.clone(),
            watches.clone(),
            executor.clone(),
            locks.clone(),
            clock.clone(),
        );

        Harness {
            service,
            history,
            watches,
            executor,
            clock,
            locks,
        }
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    /// Store `watch` and return the stored copy (with its version).
    pub fn put(&self, watch: Watch) -> Watch {
        self.watches.put(watch).0
    }

    pub async fn start(&self) -> Result<()> {
        self.service.start(&ClusterSnapshot::new("test-node", 1)).await
    }

    pub fn event(&self, watch_id: &str) -> TriggerEvent {
        TriggerEvent::new(watch_id, self.clock.now())
    }

    pub async fn fire(&self, watch_ids: &[&str]) -> Result<()> {
        let events: Vec<TriggerEvent> = watch_ids.iter().map(|id| self.event(id)).collect();
        self.service.process_events_sync(events).await
    }

    /// Wait until at least `n` records are sealed and no execution is
    /// running, then return every record.
    pub async fn sealed(&self, n: usize) -> Vec<WatchRecord> {
        let history = self.history.clone();
        let service = self.service.clone();
        crate::eventually(move || {
            let done = history
                .records()
                .iter()
                .filter(|r| r.state.is_terminal())
                .count();
            done >= n && service.current_executions().is_empty()
        })
        .await;
        self.history.records()
    }

    /// A manual context for the stored watch `watch_id`.
    pub fn manual(&self, watch_id: &str, options: ManualOptions) -> Result<WatchExecutionContext> {
        let watch = self
            .watches
            .watches()
            .into_iter()
            .find(|w| w.id == watch_id)
            .ok_or_else(|| watcher::errors::WatcherError::WatchNotFound(watch_id.to_string()))?;
        let now = self.clock.now();
        WatchExecutionContext::manual(
            watch,
            now,
            TriggerEvent::new(watch_id, now),
            self.service.default_throttle_period(),
            options,
        )
    }
}
