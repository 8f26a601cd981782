// src/watch/mod.rs

//! Watch definitions and everything the engine needs around them.
//!
//! - [`status`]: mutable per-watch status (checks, per-action ack/throttle).
//! - [`lock`]: per-watch mutual exclusion used by the execution service.
//! - [`store`]: the watch store contract plus an in-memory implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::pipeline::{Action, Condition, Input, Transform};
use crate::types::WatchId;

pub mod lock;
pub mod status;
pub mod store;

pub use lock::{WatchLock, WatchLockService};
pub use status::{AckState, ActionStatus, WatchStatus};
pub use store::{InMemoryWatchStore, WatchStore};

/// One configured action of a watch.
#[derive(Debug, Clone)]
pub struct ActionWrapper {
    pub id: String,
    pub action: Arc<dyn Action>,
    /// Overrides the watch / default throttle period for this action.
    pub throttle_period: Option<Duration>,
}

impl ActionWrapper {
    pub fn new(id: impl Into<String>, action: Arc<dyn Action>) -> Self {
        Self {
            id: id.into(),
            action,
            throttle_period: None,
        }
    }

    pub fn with_throttle_period(mut self, period: Duration) -> Self {
        self.throttle_period = Some(period);
        self
    }

    pub fn kind(&self) -> &str {
        self.action.kind()
    }
}

/// A configured rule: input + condition + optional transform + actions.
///
/// Cloning is cheap apart from the status; stages are shared behind `Arc`.
/// The execution engine works on a transient clone and writes the status
/// back through [`WatchStore::update_status`].
///
/// Clones share one nonce counter. Every execution context takes the next
/// value, so two firings of a watch at the same instant still get distinct
/// [`Wid`](crate::execution::Wid)s.
#[derive(Debug, Clone)]
pub struct Watch {
    pub id: WatchId,
    nonce: Arc<AtomicU64>,
    pub input: Arc<dyn Input>,
    pub condition: Arc<dyn Condition>,
    pub transform: Option<Arc<dyn Transform>>,
    pub actions: Vec<ActionWrapper>,
    pub throttle_period: Option<Duration>,
    /// Optimistic-concurrency version assigned by the watch store.
    pub version: u64,
    pub status: WatchStatus,
}

impl Watch {
    pub fn new(
        id: impl Into<WatchId>,
        input: Arc<dyn Input>,
        condition: Arc<dyn Condition>,
    ) -> Self {
        Self {
            id: id.into(),
            nonce: Arc::new(AtomicU64::new(0)),
            input,
            condition,
            transform: None,
            actions: Vec::new(),
            throttle_period: None,
            version: 0,
            status: WatchStatus::default(),
        }
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Arc::new(AtomicU64::new(nonce));
        self
    }

    /// Nonce the next execution context will use.
    pub fn nonce(&self) -> u64 {
        self.nonce.load(Ordering::Acquire)
    }

    /// Take a nonce for a new execution context.
    pub fn next_nonce(&self) -> u64 {
        self.nonce.fetch_add(1, Ordering::AcqRel)
    }

    /// Continue counting from `other`'s nonce; used when a watch is
    /// re-registered under the same id.
    pub(crate) fn inherit_nonce(&mut self, other: &Watch) {
        self.nonce = Arc::clone(&other.nonce);
    }

    pub fn with_transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_action(mut self, action: ActionWrapper) -> Self {
        self.status.ensure_action(&action.id);
        self.actions.push(action);
        self
    }

    pub fn with_throttle_period(mut self, period: Duration) -> Self {
        self.throttle_period = Some(period);
        self
    }

    pub fn action(&self, action_id: &str) -> Option<&ActionWrapper> {
        self.actions.iter().find(|a| a.id == action_id)
    }

    pub fn action_ids(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(|a| a.id.as_str())
    }
}
