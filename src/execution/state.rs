// src/execution/state.rs

//! Terminal execution outcomes, pipeline phases and manual action modes.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Wildcard key in a manual action-mode map that applies to every action.
pub const ALL_ACTIONS: &str = "_all";

/// Terminal outcome of one execution.
///
/// Assigned exactly once, when a history record is sealed or short-circuited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// The condition was not met; no action ran.
    ExecutionNotNeeded,
    /// The condition was met but every action was throttled.
    Throttled,
    /// The condition was met and at least one action was resolved.
    Executed,
    /// The execution could not run or the pipeline errored.
    Failed,
    /// The watch disappeared between queuing and execution.
    NotExecutedWatchMissing,
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionState::ExecutionNotNeeded => "execution_not_needed",
            ExecutionState::Throttled => "throttled",
            ExecutionState::Executed => "executed",
            ExecutionState::Failed => "failed",
            ExecutionState::NotExecutedWatchMissing => "not_executed_watch_missing",
        };
        f.write_str(s)
    }
}

/// Position of an execution context in the pipeline.
///
/// Strictly ordered; a context never goes back to an earlier phase.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    AwaitsExecution,
    Input,
    Condition,
    WatchTransform,
    Actions,
    Finished,
}

impl ExecutionPhase {
    pub fn sealed(self) -> bool {
        self == ExecutionPhase::Finished
    }

    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => ExecutionPhase::AwaitsExecution,
            1 => ExecutionPhase::Input,
            2 => ExecutionPhase::Condition,
            3 => ExecutionPhase::WatchTransform,
            4 => ExecutionPhase::Actions,
            _ => ExecutionPhase::Finished,
        }
    }
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionPhase::AwaitsExecution => "awaits_execution",
            ExecutionPhase::Input => "input",
            ExecutionPhase::Condition => "condition",
            ExecutionPhase::WatchTransform => "watch_transform",
            ExecutionPhase::Actions => "actions",
            ExecutionPhase::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// Per-action override for manually triggered executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionExecutionMode {
    /// Run the action in simulation mode, respecting throttling.
    Simulate,
    /// Run the action in simulation mode, ignoring throttling.
    ForceSimulate,
    /// Run the action for real, respecting throttling.
    Execute,
    /// Run the action for real, ignoring throttling.
    ForceExecute,
    /// Do not run the action; record it as throttled.
    Skip,
}

impl ActionExecutionMode {
    pub fn simulate(self) -> bool {
        matches!(
            self,
            ActionExecutionMode::Simulate | ActionExecutionMode::ForceSimulate
        )
    }

    pub fn force(self) -> bool {
        matches!(
            self,
            ActionExecutionMode::ForceSimulate | ActionExecutionMode::ForceExecute
        )
    }

    /// Resolve the mode for `action_id`: an explicit entry wins over the
    /// `_all` wildcard; `None` means normal execution.
    pub fn resolve(
        modes: &HashMap<String, ActionExecutionMode>,
        action_id: &str,
    ) -> Option<ActionExecutionMode> {
        modes
            .get(action_id)
            .or_else(|| modes.get(ALL_ACTIONS))
            .copied()
    }
}

impl FromStr for ActionExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simulate" => Ok(ActionExecutionMode::Simulate),
            "force_simulate" => Ok(ActionExecutionMode::ForceSimulate),
            "execute" => Ok(ActionExecutionMode::Execute),
            "force_execute" => Ok(ActionExecutionMode::ForceExecute),
            "skip" => Ok(ActionExecutionMode::Skip),
            other => Err(format!(
                "unknown action execution mode [{other}] (expected simulate, force_simulate, execute, force_execute or skip)"
            )),
        }
    }
}
