// src/config/build.rs

//! Turn a validated [`ConfigFile`] into runtime objects.

use std::sync::Arc;

use crate::config::model::{
    ActionKindConfig, ConditionConfig, ConfigFile, InputConfig, TransformConfig, WatchConfig,
};
use crate::config::validate::parse_period;
use crate::errors::{Result, WatcherError};
use crate::execution::ExecutionSettings;
use crate::pipeline::{
    Action, AlwaysCondition, CompareCondition, CompareOp, Condition, Input, LoggingAction,
    NeverCondition, SelectTransform, SimpleInput, Transform,
};
use crate::watch::{ActionWrapper, Watch};

impl ConfigFile {
    pub fn execution_settings(&self) -> Result<ExecutionSettings> {
        Ok(ExecutionSettings {
            default_throttle_period: parse_period(
                "[execution].default_throttle_period",
                &self.execution.default_throttle_period,
            )?,
        })
    }

    /// Build every configured watch, in id order.
    pub fn build_watches(&self) -> Result<Vec<Watch>> {
        self.watch
            .iter()
            .map(|(id, cfg)| build_watch(id, cfg))
            .collect()
    }
}

fn build_watch(id: &str, cfg: &WatchConfig) -> Result<Watch> {
    let input: Arc<dyn Input> = match &cfg.input {
        InputConfig::Simple { payload } => Arc::new(SimpleInput::new(payload.clone())),
    };

    let condition: Arc<dyn Condition> = match &cfg.condition {
        ConditionConfig::Always => Arc::new(AlwaysCondition),
        ConditionConfig::Never => Arc::new(NeverCondition),
        ConditionConfig::Compare { path, op, value } => {
            let op: CompareOp = op
                .parse()
                .map_err(|e| WatcherError::ConfigError(format!("[watch.{id}].condition: {e}")))?;
            Arc::new(CompareCondition::new(path.clone(), op, value.clone()))
        }
    };

    let mut watch = Watch::new(id, input, condition);

    if let Some(transform) = &cfg.transform {
        let transform: Arc<dyn Transform> = match transform {
            TransformConfig::Select { path } => Arc::new(SelectTransform::new(path.clone())),
        };
        watch = watch.with_transform(transform);
    }

    if let Some(period) = &cfg.throttle_period {
        watch = watch.with_throttle_period(parse_period(
            &format!("[watch.{id}].throttle_period"),
            period,
        )?);
    }

    for action_cfg in cfg.actions.iter() {
        let action: Arc<dyn Action> = match &action_cfg.kind {
            ActionKindConfig::Logging { text } => Arc::new(LoggingAction::new(text.clone())),
        };
        let mut wrapper = ActionWrapper::new(action_cfg.id.clone(), action);
        if let Some(period) = &action_cfg.throttle_period {
            wrapper = wrapper.with_throttle_period(parse_period(
                &format!("[watch.{id}] action '{}' throttle_period", action_cfg.id),
                period,
            )?);
        }
        watch = watch.with_action(wrapper);
    }

    Ok(watch)
}
