// src/execution/result.rs

//! Per-action results and the assembled result of one execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::{ConditionResult, InputResult, TransformResult};
use crate::types::Payload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionResultStatus {
    Executed,
    Throttled,
    Simulated,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub id: String,
    pub kind: String,
    pub status: ActionResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ActionResult {
    pub fn executed(id: impl Into<String>, kind: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            status: ActionResultStatus::Executed,
            payload: Some(payload),
            reason: None,
        }
    }

    pub fn simulated(id: impl Into<String>, kind: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            status: ActionResultStatus::Simulated,
            payload: Some(payload),
            reason: None,
        }
    }

    pub fn throttled(
        id: impl Into<String>,
        kind: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            status: ActionResultStatus::Throttled,
            payload: None,
            reason: Some(reason.into()),
        }
    }

    pub fn failed(id: impl Into<String>, kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            status: ActionResultStatus::Failed,
            payload: None,
            reason: Some(reason.into()),
        }
    }
}

/// Everything the pipeline produced for one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchExecutionResult {
    pub execution_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InputResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<TransformResult>,
    /// Action results in the watch's configured order.
    #[serde(default)]
    pub actions: Vec<ActionResult>,
}

impl WatchExecutionResult {
    pub fn condition_met(&self) -> bool {
        self.condition.as_ref().is_some_and(|c| c.met)
    }

    pub fn action(&self, id: &str) -> Option<&ActionResult> {
        self.actions.iter().find(|a| a.id == id)
    }

    /// True when there is at least one action and every one was throttled.
    pub fn all_actions_throttled(&self) -> bool {
        !self.actions.is_empty()
            && self
                .actions
                .iter()
                .all(|a| a.status == ActionResultStatus::Throttled)
    }
}
