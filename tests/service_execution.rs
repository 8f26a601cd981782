// tests/service_execution.rs

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{TestResult, init_tracing};
use serde_json::json;
use watcher::clock::Clock;
use watcher::errors::WatcherError;
use watcher::execution::{ActionExecutionMode, ActionResultStatus, ExecutionState, ManualOptions};
use watcher::history::RecordState;
use watcher::pipeline::SelectTransform;
use watcher::watch::{AckState, WatchStore};
use watcher_test_utils::builders::{HarnessBuilder, WatchBuilder};
use watcher_test_utils::fake_executor::{ManualExecutor, RejectingExecutor};
use watcher_test_utils::stages::{
    FailingAction, FailingInput, PanickingInput, RecordingAction, ToggleCondition,
};

#[tokio::test]
async fn triggered_then_manual_skip_scenario() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    let a1 = RecordingAction::new();
    let a2 = RecordingAction::new();
    h.put(
        WatchBuilder::new("W1")
            .action("A1", a1.clone())
            .action("A2", a2.clone())
            .build(),
    );
    h.start().await?;

    h.fire(&["W1"]).await?;
    let records = h.sealed(1).await;
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.execution_state(), Some(ExecutionState::Executed));
    let result = record.result.as_ref().unwrap();
    assert_eq!(result.actions.len(), 2);
    assert!(
        result
            .actions
            .iter()
            .all(|r| r.status == ActionResultStatus::Executed)
    );

    h.clock.advance(chrono::Duration::seconds(1));
    let ctx = h.manual(
        "W1",
        ManualOptions::new()
            .action_mode("A1", ActionExecutionMode::Skip)
            .record_execution(true),
    )?;
    let record = h.service.execute(ctx).await?;
    let result = record.result.as_ref().unwrap();
    assert_eq!(result.action("A1").unwrap().status, ActionResultStatus::Throttled);
    assert_eq!(result.action("A2").unwrap().status, ActionResultStatus::Executed);
    assert_eq!(record.execution_state(), Some(ExecutionState::Executed));
    assert_eq!((a1.executed(), a2.executed()), (1, 2));

    // Recorded manual executions land in the history too.
    assert_eq!(h.history.get(&record.id).unwrap(), record);
    Ok(())
}

#[tokio::test]
async fn unmet_condition_seals_execution_not_needed() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    let action = RecordingAction::new();
    h.put(
        WatchBuilder::new("quiet")
            .condition_met(false)
            .action("a", action.clone())
            .build(),
    );
    h.start().await?;

    h.fire(&["quiet"]).await?;
    let records = h.sealed(1).await;
    assert_eq!(records[0].execution_state(), Some(ExecutionState::ExecutionNotNeeded));
    assert!(records[0].result.as_ref().unwrap().actions.is_empty());
    assert_eq!(action.executed(), 0);

    let stored = h.watches.get("quiet").unwrap();
    assert_eq!(stored.status.last_checked, Some(h.clock.now()));
    assert_eq!(stored.status.last_met_condition, None);
    Ok(())
}

#[tokio::test]
async fn failing_action_does_not_stop_its_siblings() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    let after = RecordingAction::new();
    h.put(
        WatchBuilder::new("w")
            .action("broken", FailingAction::new("smtp unreachable"))
            .action("after", after.clone())
            .build(),
    );
    h.start().await?;

    h.fire(&["w"]).await?;
    let records = h.sealed(1).await;
    let result = records[0].result.as_ref().unwrap();

    let broken = result.action("broken").unwrap();
    assert_eq!(broken.status, ActionResultStatus::Failed);
    assert!(broken.reason.as_deref().unwrap().contains("smtp unreachable"));
    assert_eq!(result.action("after").unwrap().status, ActionResultStatus::Executed);
    assert_eq!(records[0].execution_state(), Some(ExecutionState::Executed));
    assert_eq!(after.executed(), 1);

    let status = h.watches.get("w").unwrap().status;
    let broken_status = status.action_status("broken").unwrap();
    assert!(!broken_status.last_execution.as_ref().unwrap().successful);
    assert_eq!(broken_status.last_successful_execution, None);
    Ok(())
}

#[tokio::test]
async fn stage_error_seals_failed_with_the_detailed_message() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    let action = RecordingAction::new();
    h.put(
        WatchBuilder::new("w")
            .input(FailingInput::new("index missing"))
            .action("a", action.clone())
            .build(),
    );
    h.start().await?;

    h.fire(&["w"]).await?;
    let records = h.sealed(1).await;
    assert_eq!(records[0].execution_state(), Some(ExecutionState::Failed));
    let message = records[0].message.as_deref().unwrap();
    assert!(message.contains("index missing"), "message was: {message}");
    assert!(records[0].result.is_none());
    assert_eq!(action.executed(), 0);

    // The lock and the registry entry are gone.
    assert!(!h.locks.is_locked("w"));
    assert!(h.service.current_executions().is_empty());
    Ok(())
}

#[tokio::test]
async fn panicking_stage_seals_failed_and_is_not_replayed() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    let action = RecordingAction::new();
    h.put(
        WatchBuilder::new("w")
            .input(PanickingInput::new("input exploded"))
            .action("a", action.clone())
            .build(),
    );
    h.start().await?;

    h.fire(&["w"]).await?;
    let records = h.sealed(1).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].execution_state(), Some(ExecutionState::Failed));
    let message = records[0].message.as_deref().unwrap();
    assert!(message.contains("input exploded"), "message was: {message}");
    assert_eq!(action.executed(), 0);
    assert!(!h.locks.is_locked("w"));

    // Nothing is left for a restart to pick up again.
    h.service.stop();
    h.start().await?;
    assert_eq!(h.service.queue_size(), 0);
    assert!(
        h.history
            .records()
            .iter()
            .all(|r| r.state != RecordState::AwaitsExecution)
    );
    Ok(())
}

#[tokio::test]
async fn panicking_stage_on_the_manual_path_returns_an_error() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    h.put(
        WatchBuilder::new("w")
            .input(PanickingInput::new("manual boom"))
            .build(),
    );

    let ctx = h.manual("w", ManualOptions::new().record_execution(true))?;
    let err = h.service.execute(ctx).await.unwrap_err();
    assert!(matches!(err, WatcherError::Panicked(ref m) if m.contains("manual boom")));
    assert!(!h.locks.is_locked("w"));
    assert!(h.service.current_executions().is_empty());
    assert!(h.history.is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_transform_fails_the_execution() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    let action = RecordingAction::new();
    h.put(
        WatchBuilder::new("w")
            .payload(json!({ "a": 1 }))
            .transform(SelectTransform::new("b"))
            .action("x", action.clone())
            .build(),
    );
    h.start().await?;

    h.fire(&["w"]).await?;
    let records = h.sealed(1).await;
    assert_eq!(records[0].execution_state(), Some(ExecutionState::Failed));
    assert!(records[0].message.as_deref().unwrap().contains("path [b] not found"));
    assert_eq!(action.executed(), 0);
    Ok(())
}

#[tokio::test]
async fn rejected_submission_seals_failed() -> TestResult {
    init_tracing();
    let executor = Arc::new(RejectingExecutor::new());
    let action = RecordingAction::new();
    let h = HarnessBuilder::new().executor(executor.clone()).build();
    h.put(WatchBuilder::new("w").action("a", action.clone()).build());
    h.start().await?;

    h.fire(&["w"]).await?;

    assert_eq!(executor.rejected(), 1);
    let records = h.history.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].execution_state(), Some(ExecutionState::Failed));
    assert_eq!(
        records[0].message.as_deref(),
        Some("failed to run triggered watch [w] due to thread pool capacity")
    );
    assert_eq!(
        h.history.writes_for(&records[0].id),
        vec![
            RecordState::AwaitsExecution,
            RecordState::Completed(ExecutionState::Failed)
        ]
    );
    assert_eq!(action.executed(), 0);
    Ok(())
}

#[tokio::test]
async fn period_throttling_and_forced_execution() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    let action = RecordingAction::new();
    h.put(
        WatchBuilder::new("w")
            .throttled_action("a", action.clone(), Duration::from_secs(10))
            .build(),
    );
    h.start().await?;

    h.fire(&["w"]).await?;
    h.sealed(1).await;
    assert_eq!(action.executed(), 1);

    h.clock.advance(chrono::Duration::seconds(1));
    h.fire(&["w"]).await?;
    let records = h.sealed(2).await;
    let second = records.iter().max_by_key(|r| r.id.execution_time()).unwrap();
    assert_eq!(second.execution_state(), Some(ExecutionState::Throttled));
    let reason = second.result.as_ref().unwrap().action("a").unwrap().reason.clone().unwrap();
    assert!(reason.contains("[10000ms]"), "reason was: {reason}");
    assert!(reason.contains("[1000ms]"), "reason was: {reason}");
    assert_eq!(action.executed(), 1);

    let stored = h.watches.get("w").unwrap();
    assert!(stored.status.action_status("a").unwrap().last_throttle.is_some());

    // Forcing bypasses the throttle.
    h.clock.advance(chrono::Duration::seconds(1));
    let ctx = h.manual(
        "w",
        ManualOptions::new().action_mode("a", ActionExecutionMode::ForceExecute),
    )?;
    let record = h.service.execute(ctx).await?;
    assert_eq!(
        record.result.as_ref().unwrap().action("a").unwrap().status,
        ActionResultStatus::Executed
    );
    assert_eq!(action.executed(), 2);

    // Once the period elapsed the action runs again.
    h.clock.advance(chrono::Duration::seconds(10));
    h.fire(&["w"]).await?;
    h.sealed(3).await;
    assert_eq!(action.executed(), 3);
    Ok(())
}

#[tokio::test]
async fn acked_actions_stay_quiet_until_the_condition_resets() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    let action = RecordingAction::new();
    let condition = ToggleCondition::new(true);
    h.put(
        WatchBuilder::new("w")
            .condition(condition.clone())
            .action("a", action.clone())
            .build(),
    );
    h.start().await?;

    h.fire(&["w"]).await?;
    h.sealed(1).await;
    assert_eq!(
        h.watches.get("w").unwrap().status.action_status("a").unwrap().ack,
        AckState::Ackable
    );

    assert!(h.watches.ack("w", &[])?);
    h.clock.advance(chrono::Duration::seconds(1));
    h.fire(&["w"]).await?;
    let records = h.sealed(2).await;
    let latest = records.iter().max_by_key(|r| r.id.execution_time()).unwrap();
    assert_eq!(latest.execution_state(), Some(ExecutionState::Throttled));
    assert_eq!(
        latest.result.as_ref().unwrap().action("a").unwrap().reason.as_deref(),
        Some("action [a] has been acknowledged")
    );
    assert_eq!(action.executed(), 1);

    // An unmet check resets the acknowledgement.
    condition.set(false);
    h.clock.advance(chrono::Duration::seconds(1));
    h.fire(&["w"]).await?;
    h.sealed(3).await;
    assert_eq!(
        h.watches.get("w").unwrap().status.action_status("a").unwrap().ack,
        AckState::AwaitsSuccessfulExecution
    );

    condition.set(true);
    h.clock.advance(chrono::Duration::seconds(1));
    h.fire(&["w"]).await?;
    h.sealed(4).await;
    assert_eq!(action.executed(), 2);
    Ok(())
}

#[tokio::test]
async fn version_conflict_surfaces_on_the_sync_path() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    let action = RecordingAction::new();
    h.put(WatchBuilder::new("w").action("a", action.clone()).build());

    let ctx = h.manual("w", ManualOptions::new().record_execution(true))?;
    // Someone redefines the watch while the manual request is in flight.
    h.put(WatchBuilder::new("w").action("a", action.clone()).build());

    let err = h.service.execute(ctx).await.unwrap_err();
    assert!(matches!(err, WatcherError::VersionConflict { ref watch_id } if watch_id == "w"));
    assert!(h.history.is_empty());
    assert!(!h.locks.is_locked("w"));
    Ok(())
}

#[tokio::test]
async fn unrecorded_manual_execution_leaves_no_trace() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    let action = RecordingAction::new();
    let stored = h.put(WatchBuilder::new("w").action("a", action.clone()).build());

    let ctx = h.manual("w", ManualOptions::new())?;
    let record = h.service.execute(ctx).await?;

    assert_eq!(record.execution_state(), Some(ExecutionState::Executed));
    assert_eq!(action.executed(), 1);
    assert!(h.history.is_empty());
    assert_eq!(h.watches.get("w").unwrap().version, stored.version);
    Ok(())
}

#[tokio::test]
async fn watch_deleted_while_queued_is_not_executed() -> TestResult {
    init_tracing();
    let executor = Arc::new(ManualExecutor::new());
    let action = RecordingAction::new();
    let h = HarnessBuilder::new().executor(executor.clone()).build();
    h.put(WatchBuilder::new("w").action("a", action.clone()).build());
    h.start().await?;

    h.fire(&["w"]).await?;
    h.watches.delete("w");
    executor.run_all().await;

    let records = h.history.records();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].execution_state(),
        Some(ExecutionState::NotExecutedWatchMissing)
    );
    assert!(records[0].message.as_deref().unwrap().contains("deleted"));
    assert_eq!(action.executed(), 0);
    Ok(())
}
