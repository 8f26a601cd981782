// tests/config_loading.rs

mod common;

use std::io::Write;
use std::time::Duration;

use common::{SAMPLE_CONFIG, TestResult};
use tempfile::NamedTempFile;
use watcher::config::{ConditionConfig, load_and_validate, load_from_str};
use watcher::config::model::ConfigFile;
use watcher::errors::WatcherError;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

fn expect_config_error(contents: &str) -> String {
    let file = write_config(contents);
    match load_and_validate(file.path()) {
        Err(WatcherError::ConfigError(msg)) => msg,
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn sample_config_loads_and_builds_watches() -> TestResult {
    let file = write_config(SAMPLE_CONFIG);
    let cfg = load_and_validate(file.path())?;

    assert_eq!(cfg.execution.thread_pool_size, 2);
    assert_eq!(cfg.execution.queue_capacity, 10);
    assert_eq!(
        cfg.execution_settings()?.default_throttle_period,
        Duration::from_secs(5)
    );
    assert!(matches!(
        cfg.watch["disk_usage"].condition,
        ConditionConfig::Compare { .. }
    ));

    let watches = cfg.build_watches()?;
    assert_eq!(watches.len(), 2);

    let disk = &watches[0];
    assert_eq!(disk.id, "disk_usage");
    assert_eq!(disk.throttle_period, Some(Duration::from_secs(60)));
    assert_eq!(disk.input.kind(), "simple");
    assert_eq!(disk.condition.kind(), "compare");
    assert_eq!(disk.transform.as_ref().map(|t| t.kind()), Some("select"));
    assert_eq!(disk.action_ids().collect::<Vec<_>>(), vec!["log", "log_again"]);
    assert_eq!(disk.actions[0].throttle_period, Some(Duration::from_secs(10)));
    assert_eq!(disk.actions[1].throttle_period, None);
    assert!(disk.status.action_status("log").is_some());

    let heartbeat = &watches[1];
    assert_eq!(heartbeat.condition.kind(), "never");
    assert!(heartbeat.actions.is_empty());
    Ok(())
}

#[test]
fn execution_section_has_defaults() -> TestResult {
    let raw = load_from_str(
        r#"
[watch.w]
"#,
    )?;
    let cfg = ConfigFile::try_from(raw)?;
    assert_eq!(cfg.execution.default_throttle_period, "5s");
    assert_eq!(cfg.execution.queue_capacity, 1000);
    assert!(cfg.execution.thread_pool_size >= 1);
    Ok(())
}

#[test]
fn zero_default_throttle_period_is_allowed() -> TestResult {
    let raw = load_from_str(
        r#"
[execution]
default_throttle_period = "0s"

[watch.w]
"#,
    )?;
    let cfg = ConfigFile::try_from(raw)?;
    assert_eq!(cfg.execution_settings()?.default_throttle_period, Duration::ZERO);
    Ok(())
}

#[test]
fn config_without_watches_is_rejected() {
    let msg = expect_config_error(
        r#"
[execution]
thread_pool_size = 2
"#,
    );
    assert!(msg.contains("at least one [watch.<id>]"));
}

#[test]
fn zero_sizes_are_rejected() {
    let msg = expect_config_error(
        r#"
[execution]
thread_pool_size = 0

[watch.w]
"#,
    );
    assert!(msg.contains("thread_pool_size"));

    let msg = expect_config_error(
        r#"
[execution]
queue_capacity = 0

[watch.w]
"#,
    );
    assert!(msg.contains("queue_capacity"));
}

#[test]
fn bad_durations_are_rejected() {
    let msg = expect_config_error(
        r#"
[watch.w]
throttle_period = "soon"
"#,
    );
    assert!(msg.contains("[watch.w].throttle_period"));

    let msg = expect_config_error(
        r#"
[watch.w]

[[watch.w.action]]
id = "a"
type = "logging"
text = "hi"
throttle_period = "5 weeks"
"#,
    );
    assert!(msg.contains("action 'a' throttle_period"));
}

#[test]
fn action_ids_must_be_unique_and_not_reserved() {
    let msg = expect_config_error(
        r#"
[watch.w]

[[watch.w.action]]
id = "a"
type = "logging"
text = "one"

[[watch.w.action]]
id = "a"
type = "logging"
text = "two"
"#,
    );
    assert!(msg.contains("duplicate action id 'a'"));

    let msg = expect_config_error(
        r#"
[watch.w]

[[watch.w.action]]
id = "_all"
type = "logging"
text = "one"
"#,
    );
    assert!(msg.contains("reserved"));

    let msg = expect_config_error(
        r#"
[watch.w]

[[watch.w.action]]
id = "  "
type = "logging"
text = "one"
"#,
    );
    assert!(msg.contains("empty id"));
}

#[test]
fn unknown_compare_op_is_rejected() {
    let msg = expect_config_error(
        r#"
[watch.w]
condition = { type = "compare", path = "x", op = "roughly", value = 1 }
"#,
    );
    assert!(msg.contains("unknown compare op [roughly]"));
}

#[test]
fn unknown_fields_and_types_are_toml_errors() {
    for contents in [
        "[watch.w]\nschedule = \"1m\"\n",
        "[watch.w]\ninput = { type = \"http\" }\n",
        "[watch.w]\n[[watch.w.action]]\nid = \"a\"\ntype = \"email\"\n",
    ] {
        let file = write_config(contents);
        match load_and_validate(file.path()) {
            Err(WatcherError::TomlError(_)) => {}
            other => panic!("Expected TomlError for {contents:?}, got: {other:?}"),
        }
    }
}

#[test]
fn missing_file_is_an_io_error() {
    match load_and_validate("/definitely/not/here/Watcher.toml") {
        Err(WatcherError::IoError(_)) => {}
        other => panic!("Expected IoError, got: {other:?}"),
    }
}
