// src/execution/throttle.rs

//! Decides whether an action should be suppressed for this execution.
//!
//! Two rules, checked in order:
//! 1. acknowledgement: an acked action stays quiet until the condition is
//!    no longer met;
//! 2. period: an action that last ran successfully less than its throttle
//!    period ago is suppressed. The period is taken from the action, then
//!    the watch, then the service default; `None` disables the rule.

use chrono::Duration as ChronoDuration;

use crate::watch::{AckState, ActionWrapper};

use super::context::WatchExecutionContext;

/// Returns the throttle reason when `action` must not run.
pub fn throttle(ctx: &WatchExecutionContext, action: &ActionWrapper) -> Option<String> {
    let status = ctx.watch().status.action_status(&action.id)?;

    if status.ack == AckState::Acked {
        return Some(format!("action [{}] has been acknowledged", action.id));
    }

    let period = action
        .throttle_period
        .or(ctx.watch().throttle_period)
        .or(ctx.default_throttle_period())?;
    if period.is_zero() {
        return None;
    }

    let last = status.last_successful_execution?;
    let period = ChronoDuration::from_std(period).ok()?;
    let elapsed = ctx.execution_time() - last;
    if elapsed < period {
        return Some(format!(
            "throttling interval is set to [{}ms] but time elapsed since last execution is [{}ms]",
            period.num_milliseconds(),
            elapsed.num_milliseconds()
        ));
    }
    None
}
