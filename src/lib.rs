// src/lib.rs

pub mod cli;
pub mod clock;
pub mod config;
pub mod errors;
pub mod execution;
pub mod history;
pub mod logging;
pub mod pipeline;
pub mod trigger;
pub mod types;
pub mod watch;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::clock::{Clock, SystemClock};
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::execution::{BoundedExecutor, ExecutionService};
use crate::history::InMemoryHistoryStore;
use crate::trigger::TriggerEvent;
use crate::types::{ClusterSnapshot, parse_duration};
use crate::watch::{InMemoryWatchStore, Watch, WatchLockService};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - in-memory watch and history stores
/// - executor + execution service
///
/// and then fires every watch once, waits for the records to be sealed and
/// prints them as JSON lines on stdout.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;
    let watches = cfg.build_watches()?;

    if args.dry_run {
        print_dry_run(&cfg, &watches);
        return Ok(());
    }

    let timeout = parse_duration(&args.timeout).map_err(anyhow::Error::msg)?;
    let settings = cfg.execution_settings()?;

    let watch_store = Arc::new(InMemoryWatchStore::new());
    for watch in watches {
        watch_store.put(watch);
    }
    let history = Arc::new(InMemoryHistoryStore::new());
    let executor = Arc::new(BoundedExecutor::new(
        cfg.execution.thread_pool_size,
        cfg.execution.queue_capacity,
    ));
    let clock = Arc::new(SystemClock);

    let service = ExecutionService::new(
        settings,
        history.clone(),
        watch_store.clone(),
        executor.clone(),
        WatchLockService::new(),
        clock.clone(),
    );
    service.start(&ClusterSnapshot::new("local", 1)).await?;

    let now = clock.now();
    let events: Vec<TriggerEvent> = watch_store
        .watches()
        .iter()
        .map(|w| TriggerEvent::new(w.id.clone(), now))
        .collect();
    info!(count = events.len(), "firing watches");
    service.process_events_sync(events).await?;

    if !wait_until_sealed(&service, &history, timeout).await {
        warn!(?timeout, "timed out waiting for executions to finish");
        for snapshot in service.current_executions() {
            warn!(
                wid = %snapshot.wid,
                phase = %snapshot.phase,
                worker = %snapshot.worker,
                running_for_ms = snapshot.running_for_ms,
                "execution still running"
            );
        }
    }

    for record in history.records() {
        println!("{}", serde_json::to_string(&record)?);
    }

    service.stop();
    executor.shutdown().await;
    Ok(())
}

/// Poll until every stored record is sealed and no execution is running.
async fn wait_until_sealed(
    service: &ExecutionService,
    history: &InMemoryHistoryStore,
    timeout: Duration,
) -> bool {
    let poll = async {
        loop {
            let sealed = history.records().iter().all(|r| r.state.is_terminal());
            if sealed && service.queue_size() == 0 && service.current_executions().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(timeout, poll).await.is_ok()
}

/// Simple dry-run output: print execution settings and watches.
fn print_dry_run(cfg: &ConfigFile, watches: &[Watch]) {
    println!("watcher dry-run");
    println!(
        "  execution.default_throttle_period = {}",
        cfg.execution.default_throttle_period
    );
    println!("  execution.thread_pool_size = {}", cfg.execution.thread_pool_size);
    println!("  execution.queue_capacity = {}", cfg.execution.queue_capacity);
    println!();

    println!("watches ({}):", watches.len());
    for watch in watches {
        println!("  - {}", watch.id);
        println!("      input: {}", watch.input.kind());
        println!("      condition: {}", watch.condition.kind());
        if let Some(transform) = &watch.transform {
            println!("      transform: {}", transform.kind());
        }
        if let Some(period) = watch.throttle_period {
            println!("      throttle_period: {period:?}");
        }
        for action in watch.actions.iter() {
            match action.throttle_period {
                Some(period) => println!(
                    "      action {} ({}), throttle_period: {period:?}",
                    action.id,
                    action.kind()
                ),
                None => println!("      action {} ({})", action.id, action.kind()),
            }
        }
    }

    debug!("dry-run complete (no execution)");
}
