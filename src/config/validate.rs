// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ConditionConfig, ConfigFile, RawConfigFile, WatchConfig};
use crate::errors::{Result, WatcherError};
use crate::execution::ALL_ACTIONS;
use crate::pipeline::CompareOp;
use crate::types::ConfigDuration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::WatcherError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.execution, raw.watch))
    }
}

/// Re-run validation on an already constructed config.
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    validate_raw_config(&RawConfigFile {
        execution: cfg.execution.clone(),
        watch: cfg.watch.clone(),
    })
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_watches(cfg)?;
    validate_execution_section(cfg)?;
    for (id, watch) in cfg.watch.iter() {
        validate_watch(id, watch)?;
    }
    Ok(())
}

fn ensure_has_watches(cfg: &RawConfigFile) -> Result<()> {
    if cfg.watch.is_empty() {
        return Err(WatcherError::ConfigError(
            "config must contain at least one [watch.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_execution_section(cfg: &RawConfigFile) -> Result<()> {
    let execution = &cfg.execution;

    if execution.thread_pool_size == 0 {
        return Err(WatcherError::ConfigError(
            "[execution].thread_pool_size must be >= 1 (got 0)".to_string(),
        ));
    }
    if execution.queue_capacity == 0 {
        return Err(WatcherError::ConfigError(
            "[execution].queue_capacity must be >= 1 (got 0)".to_string(),
        ));
    }
    parse_period("[execution].default_throttle_period", &execution.default_throttle_period)?;
    Ok(())
}

fn validate_watch(id: &str, watch: &WatchConfig) -> Result<()> {
    if id.trim().is_empty() {
        return Err(WatcherError::ConfigError(
            "watch ids must not be empty".to_string(),
        ));
    }
    if let Some(period) = &watch.throttle_period {
        parse_period(&format!("[watch.{id}].throttle_period"), period)?;
    }

    if let ConditionConfig::Compare { op, .. } = &watch.condition {
        op.parse::<CompareOp>()
            .map_err(|e| WatcherError::ConfigError(format!("[watch.{id}].condition: {e}")))?;
    }

    let mut seen = HashSet::new();
    for action in watch.actions.iter() {
        if action.id.trim().is_empty() {
            return Err(WatcherError::ConfigError(format!(
                "watch '{id}' has an action with an empty id"
            )));
        }
        if action.id == ALL_ACTIONS {
            return Err(WatcherError::ConfigError(format!(
                "watch '{id}' cannot name an action '{ALL_ACTIONS}' (reserved)"
            )));
        }
        if !seen.insert(action.id.as_str()) {
            return Err(WatcherError::ConfigError(format!(
                "watch '{id}' has duplicate action id '{}'",
                action.id
            )));
        }
        if let Some(period) = &action.throttle_period {
            parse_period(
                &format!("[watch.{id}] action '{}' throttle_period", action.id),
                period,
            )?;
        }
    }

    Ok(())
}

pub(crate) fn parse_period(field: &str, value: &str) -> Result<std::time::Duration> {
    value
        .parse::<ConfigDuration>()
        .map(|d| d.0)
        .map_err(|e| WatcherError::ConfigError(format!("{field}: {e}")))
}
