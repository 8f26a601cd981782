// src/trigger.rs

//! Trigger events handed to the execution service by the (external) trigger
//! detector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::WatchId;

/// A signal that a specific watch should be evaluated now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Id of the watch this event fires.
    pub job_name: WatchId,
    /// When the trigger actually fired.
    pub triggered_time: DateTime<Utc>,
    /// When the trigger was scheduled to fire, if it came from a schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<DateTime<Utc>>,
}

impl TriggerEvent {
    pub fn new(job_name: impl Into<WatchId>, triggered_time: DateTime<Utc>) -> Self {
        Self {
            job_name: job_name.into(),
            triggered_time,
            scheduled_time: None,
        }
    }

    pub fn scheduled(
        job_name: impl Into<WatchId>,
        triggered_time: DateTime<Utc>,
        scheduled_time: DateTime<Utc>,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            triggered_time,
            scheduled_time: Some(scheduled_time),
        }
    }

    pub fn watch_id(&self) -> &str {
        &self.job_name
    }
}
