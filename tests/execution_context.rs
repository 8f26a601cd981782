// tests/execution_context.rs

mod common;

use common::{TestResult, init_tracing};
use serde_json::json;
use watcher::errors::WatcherError;
use watcher::execution::{
    ALL_ACTIONS, ActionExecutionMode, ActionResult, ActionResultStatus, ContextKind,
    ExecutionPhase, ManualOptions,
};
use watcher::pipeline::SelectTransform;
use watcher_test_utils::builders::{HarnessBuilder, WatchBuilder};
use watcher_test_utils::stages::RecordingAction;

#[tokio::test]
async fn manual_context_rejects_unknown_action_ids() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    h.put(WatchBuilder::new("w").action("a1", RecordingAction::new()).build());

    let err = h
        .manual(
            "w",
            ManualOptions::new().action_mode("nope", ActionExecutionMode::Execute),
        )
        .unwrap_err();
    assert!(matches!(err, WatcherError::InvalidRequest(msg) if msg.contains("nope")));

    // The wildcard is always accepted.
    h.manual(
        "w",
        ManualOptions::new().action_mode(ALL_ACTIONS, ActionExecutionMode::Simulate),
    )?;
    Ok(())
}

#[tokio::test]
async fn skip_all_resolves_every_action_up_front() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    let a1 = RecordingAction::new();
    let a2 = RecordingAction::new();
    h.put(
        WatchBuilder::new("w")
            .action("a1", a1.clone())
            .action("a2", a2.clone())
            .build(),
    );

    let mut ctx = h.manual(
        "w",
        ManualOptions::new().action_mode(ALL_ACTIONS, ActionExecutionMode::Skip),
    )?;
    assert!(ctx.has_action_result("a1"));
    assert!(ctx.has_action_result("a2"));
    assert_eq!(ctx.progress().resolved_actions(), vec!["a1", "a2"]);

    let result = h.service.execute_inner(&mut ctx).await?;
    assert_eq!(result.actions.len(), 2);
    for r in &result.actions {
        assert_eq!(r.status, ActionResultStatus::Throttled);
        assert_eq!(r.reason.as_deref(), Some("manually skipped"));
    }
    assert!(result.all_actions_throttled());
    assert_eq!(a1.executed() + a1.simulated(), 0);
    assert_eq!(a2.executed() + a2.simulated(), 0);
    Ok(())
}

#[tokio::test]
async fn condition_decides_how_many_action_results_exist() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    let action = RecordingAction::new();
    h.put(
        WatchBuilder::new("met")
            .action("a1", action.clone())
            .action("a2", action.clone())
            .action("a3", action.clone())
            .build(),
    );
    h.put(
        WatchBuilder::new("unmet")
            .condition_met(false)
            .action("a1", action.clone())
            .action("a2", action.clone())
            .build(),
    );

    let mut ctx = h.manual("met", ManualOptions::new())?;
    let result = h.service.execute_inner(&mut ctx).await?;
    assert!(result.condition_met());
    assert_eq!(result.actions.len(), 3);
    assert_eq!(ctx.phase(), ExecutionPhase::Finished);

    let mut ctx = h.manual("unmet", ManualOptions::new())?;
    let result = h.service.execute_inner(&mut ctx).await?;
    assert!(!result.condition_met());
    assert!(result.actions.is_empty());
    assert_eq!(action.executed(), 3);
    Ok(())
}

#[tokio::test]
async fn simulate_and_force_modes() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    let sim = RecordingAction::new();
    let real = RecordingAction::new();
    h.put(
        WatchBuilder::new("w")
            .action("sim", sim.clone())
            .action("real", real.clone())
            .build(),
    );

    let ctx = h.manual(
        "w",
        ManualOptions::new()
            .action_mode("sim", ActionExecutionMode::ForceSimulate)
            .action_mode("real", ActionExecutionMode::Execute),
    )?;
    assert!(ctx.simulate_action("sim"));
    assert!(ctx.skip_throttling("sim"));
    assert!(!ctx.simulate_action("real"));
    assert!(!ctx.skip_throttling("real"));
    assert!(!ctx.record_execution());
    assert!(matches!(ctx.kind(), ContextKind::Manual(_)));

    let mut ctx = ctx;
    let result = h.service.execute_inner(&mut ctx).await?;
    assert_eq!(result.action("sim").unwrap().status, ActionResultStatus::Simulated);
    assert_eq!(result.action("real").unwrap().status, ActionResultStatus::Executed);
    assert_eq!((sim.simulated(), sim.executed()), (1, 0));
    assert_eq!((real.simulated(), real.executed()), (0, 1));
    Ok(())
}

#[tokio::test]
async fn alternative_input_and_ignored_condition() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    let action = RecordingAction::new();
    h.put(
        WatchBuilder::new("w")
            .payload(json!({ "from": "input" }))
            .condition_met(false)
            .action("a1", action.clone())
            .build(),
    );

    let mut ctx = h.manual(
        "w",
        ManualOptions::new()
            .alternative_input(json!({ "from": "caller" }))
            .ignore_condition(true),
    )?;
    let result = h.service.execute_inner(&mut ctx).await?;

    assert!(result.condition_met());
    assert_eq!(result.input.as_ref().unwrap().payload, json!({ "from": "caller" }));
    let output = result.action("a1").unwrap().payload.clone().unwrap();
    assert_eq!(output["payload"], json!({ "from": "caller" }));
    Ok(())
}

#[tokio::test]
async fn transform_output_is_what_actions_see() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    let action = RecordingAction::new();
    h.put(
        WatchBuilder::new("w")
            .payload(json!({ "hits": { "total": 12 } }))
            .transform(SelectTransform::new("hits"))
            .action("a1", action.clone())
            .build(),
    );

    let mut ctx = h.manual("w", ManualOptions::new())?;
    let result = h.service.execute_inner(&mut ctx).await?;

    assert_eq!(result.transform.as_ref().unwrap().payload, json!({ "total": 12 }));
    assert_eq!(ctx.payload(), &json!({ "total": 12 }));
    let output = result.action("a1").unwrap().payload.clone().unwrap();
    assert_eq!(output["payload"], json!({ "total": 12 }));
    Ok(())
}

#[tokio::test]
async fn duplicate_action_results_are_dropped() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    h.put(WatchBuilder::new("w").action("a1", RecordingAction::new()).build());

    let mut ctx = h.manual("w", ManualOptions::new())?;
    ctx.on_action_result(ActionResult::executed("a1", "recording", json!(1)));
    ctx.on_action_result(ActionResult::failed("a1", "recording", "late"));

    assert_eq!(ctx.action_results().len(), 1);
    assert_eq!(ctx.action_results()[0].status, ActionResultStatus::Executed);
    Ok(())
}

#[tokio::test]
async fn phases_advance_through_the_pipeline() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    h.put(WatchBuilder::new("w").build());

    let mut ctx = h.manual("w", ManualOptions::new())?;
    assert_eq!(ctx.phase(), ExecutionPhase::AwaitsExecution);
    ctx.before_input();
    assert_eq!(ctx.phase(), ExecutionPhase::Input);
    ctx.before_condition();
    ctx.before_actions();
    assert_eq!(ctx.phase(), ExecutionPhase::Actions);
    let result = ctx.finish();
    assert_eq!(ctx.phase(), ExecutionPhase::Finished);
    assert!(ctx.phase().sealed());
    assert!(result.actions.is_empty());
    Ok(())
}

#[tokio::test]
async fn contexts_of_one_watch_take_increasing_nonces() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    h.put(WatchBuilder::new("w").build());

    let first = h.manual("w", ManualOptions::new())?;
    let second = h.manual("w", ManualOptions::new())?;
    assert_eq!(first.execution_time(), second.execution_time());
    assert_eq!(first.id().nonce(), 0);
    assert_eq!(second.id().nonce(), 1);
    assert_ne!(first.id(), second.id());

    // Re-registering the watch keeps counting instead of starting over.
    h.put(WatchBuilder::new("w").build());
    let third = h.manual("w", ManualOptions::new())?;
    assert_eq!(third.id().nonce(), 2);
    Ok(())
}
