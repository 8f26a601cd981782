// src/config/mod.rs

//! Configuration loading and validation for watcher.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate durations, sizes and action ids (`validate.rs`).
//! - Build watches and service settings from it (`build.rs`).

pub mod build;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{
    ActionConfig, ActionKindConfig, ConditionConfig, ConfigFile, ExecutionSection, InputConfig,
    RawConfigFile, TransformConfig, WatchConfig,
};
pub use validate::validate_config;
