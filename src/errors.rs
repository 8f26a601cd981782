// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::execution::executor::RejectedExecution;
use crate::pipeline::StageError;

#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("execution service is not started")]
    NotStarted,

    #[error("invalid execution request: {0}")]
    InvalidRequest(String),

    #[error("Watch not found: {0}")]
    WatchNotFound(String),

    #[error("failed to update the watch [{watch_id}] on execute, perhaps it was force deleted")]
    VersionConflict { watch_id: String },

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Rejected(#[from] RejectedExecution),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("watch execution panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WatcherError {
    /// Render the error together with its whole `source()` chain.
    ///
    /// This is what ends up in the `message` field of a failed history
    /// record, so an operator sees the root cause and not just the wrapper.
    pub fn detailed_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let cause_msg = cause.to_string();
            if !message.contains(&cause_msg) {
                message.push_str("; nested: ");
                message.push_str(&cause_msg);
            }
            source = cause.source();
        }
        message
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WatcherError>;
