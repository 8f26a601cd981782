#![allow(dead_code)]

use std::error::Error;

pub use watcher_test_utils::{eventually, init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn Error>>;

/// A small but complete config file.
pub const SAMPLE_CONFIG: &str = r#"
[execution]
default_throttle_period = "5s"
thread_pool_size = 2
queue_capacity = 10

[watch.disk_usage]
throttle_period = "1m"
input = { type = "simple", payload = { disk = { used = 93 } } }
condition = { type = "compare", path = "disk.used", op = "gte", value = 90 }
transform = { type = "select", path = "disk" }

[[watch.disk_usage.action]]
id = "log"
type = "logging"
text = "disk usage high on {{ctx.watch_id}}: {{ctx.payload.used}}"
throttle_period = "10s"

[[watch.disk_usage.action]]
id = "log_again"
type = "logging"
text = "second action"

[watch.heartbeat]
condition = { type = "never" }
"#;
