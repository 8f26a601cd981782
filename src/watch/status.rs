// src/watch/status.rs

//! Mutable per-watch status written back after each recorded execution.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::execution::result::{ActionResult, ActionResultStatus};
use crate::execution::state::ALL_ACTIONS;

/// Acknowledgement state of one action.
///
/// An action becomes ackable after it executed successfully; once acked it is
/// throttled until the watch condition stops being met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckState {
    #[default]
    AwaitsSuccessfulExecution,
    Ackable,
    Acked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionExecution {
    pub timestamp: DateTime<Utc>,
    pub successful: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionThrottle {
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionStatus {
    pub ack: AckState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_execution: Option<ActionExecution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_successful_execution: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_throttle: Option<ActionThrottle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WatchStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_met_condition: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actions: BTreeMap<String, ActionStatus>,
    #[serde(skip)]
    dirty: bool,
}

impl WatchStatus {
    pub fn new<I, S>(action_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            actions: action_ids
                .into_iter()
                .map(|id| (id.into(), ActionStatus::default()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn action_status(&self, action_id: &str) -> Option<&ActionStatus> {
        self.actions.get(action_id)
    }

    pub fn dirty(&self) -> bool {
        self.dirty
    }

    pub fn reset_dirty(&mut self) {
        self.dirty = false;
    }

    pub(crate) fn ensure_action(&mut self, action_id: &str) {
        self.actions.entry(action_id.to_string()).or_default();
    }

    /// Record that the condition was evaluated at `time`.
    ///
    /// When the condition is not met, every action's acknowledgement is
    /// reset so the next time it is met actions run again.
    pub fn on_check(&mut self, met: bool, time: DateTime<Utc>) {
        self.last_checked = Some(time);
        if met {
            self.last_met_condition = Some(time);
        } else {
            for status in self.actions.values_mut() {
                status.ack = AckState::AwaitsSuccessfulExecution;
            }
        }
        self.dirty = true;
    }

    pub fn on_action_result(&mut self, result: &ActionResult, time: DateTime<Utc>) {
        let status = self.actions.entry(result.id.clone()).or_default();
        match result.status {
            ActionResultStatus::Executed => {
                status.last_execution = Some(ActionExecution {
                    timestamp: time,
                    successful: true,
                    reason: None,
                });
                status.last_successful_execution = Some(time);
                if status.ack == AckState::AwaitsSuccessfulExecution {
                    status.ack = AckState::Ackable;
                }
            }
            ActionResultStatus::Failed => {
                status.last_execution = Some(ActionExecution {
                    timestamp: time,
                    successful: false,
                    reason: result.reason.clone(),
                });
            }
            ActionResultStatus::Throttled => {
                status.last_throttle = Some(ActionThrottle {
                    timestamp: time,
                    reason: result.reason.clone().unwrap_or_default(),
                });
            }
            ActionResultStatus::Simulated => {}
        }
        self.dirty = true;
    }

    /// Acknowledge the given actions (every action when the list is empty or
    /// contains `_all`). Returns whether any action changed state.
    pub fn ack(&mut self, action_ids: &[String]) -> bool {
        let all = action_ids.is_empty() || action_ids.iter().any(|id| id == ALL_ACTIONS);
        let mut changed = false;
        for (id, status) in self.actions.iter_mut() {
            if !all && !action_ids.contains(id) {
                continue;
            }
            if status.ack == AckState::Ackable {
                status.ack = AckState::Acked;
                changed = true;
                debug!(action = %id, "action acknowledged");
            }
        }
        if changed {
            self.dirty = true;
        }
        changed
    }
}
