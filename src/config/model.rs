// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::Payload;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [execution]
/// default_throttle_period = "5s"
/// thread_pool_size = 4
/// queue_capacity = 1000
///
/// [watch.disk_usage]
/// input = { type = "simple", payload = { used = 93 } }
/// condition = { type = "compare", path = "used", op = "gte", value = 90 }
///
/// [[watch.disk_usage.action]]
/// id = "log"
/// type = "logging"
/// text = "disk usage high on {{ctx.watch_id}}"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub execution: ExecutionSection,

    /// All watches from `[watch.<id>]`, keyed by watch id.
    #[serde(default)]
    pub watch: BTreeMap<String, WatchConfig>,
}

/// Validated configuration. Only obtainable through
/// `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub execution: ExecutionSection,
    pub watch: BTreeMap<String, WatchConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        execution: ExecutionSection,
        watch: BTreeMap<String, WatchConfig>,
    ) -> Self {
        Self { execution, watch }
    }
}

/// `[execution]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionSection {
    /// Throttle period for actions and watches that configure none.
    /// `"0s"` disables period throttling.
    #[serde(default = "default_throttle_period")]
    pub default_throttle_period: String,

    /// Number of executor workers.
    #[serde(default = "default_thread_pool_size")]
    pub thread_pool_size: usize,

    /// Executions that may wait for a free worker before new ones are
    /// rejected.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_throttle_period() -> String {
    "5s".to_string()
}

fn default_thread_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 5)
        .unwrap_or(5)
}

fn default_queue_capacity() -> usize {
    1000
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            default_throttle_period: default_throttle_period(),
            thread_pool_size: default_thread_pool_size(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// `[watch.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    /// Overrides `[execution].default_throttle_period` for this watch.
    #[serde(default)]
    pub throttle_period: Option<String>,

    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub condition: ConditionConfig,

    #[serde(default)]
    pub transform: Option<TransformConfig>,

    /// `[[watch.<id>.action]]` entries, in execution order.
    #[serde(default, rename = "action")]
    pub actions: Vec<ActionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputConfig {
    /// Always yields `payload`.
    Simple {
        #[serde(default)]
        payload: Payload,
    },
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig::Simple {
            payload: Payload::Null,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionConfig {
    #[default]
    Always,
    Never,
    /// Compare the payload value at `path` with `value` using `op`
    /// (`eq`, `not_eq`, `gt`, `gte`, `lt`, `lte`).
    Compare {
        path: String,
        op: String,
        value: Payload,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformConfig {
    /// Replace the payload with the value at `path`.
    Select { path: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionConfig {
    pub id: String,

    #[serde(default)]
    pub throttle_period: Option<String>,

    #[serde(flatten)]
    pub kind: ActionKindConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKindConfig {
    /// Log a rendered template (see `LoggingAction`).
    Logging { text: String },
}
