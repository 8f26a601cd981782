// src/pipeline/mod.rs

//! Pluggable pipeline stages.
//!
//! A watch is made of one [`Input`], one [`Condition`], an optional
//! [`Transform`] and a list of [`Action`]s. The execution engine only relies
//! on the polymorphic `execute` contract defined here; concrete stages live
//! outside the engine. [`builtin`] provides a few simple ones used by the
//! CLI and by tests.
//!
//! Stage futures are boxed (see [`BoxFuture`]) so the traits stay object
//! safe and watches can hold `Arc<dyn Input>` etc.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::execution::WatchExecutionContext;
use crate::types::{BoxFuture, Payload};

pub mod builtin;

pub use builtin::{
    AlwaysCondition, CompareCondition, CompareOp, LoggingAction, NeverCondition, SelectTransform,
    SimpleInput,
};

/// Error raised by a stage that could not produce a result at all.
///
/// A stage that ran but "failed" in a domain sense should return a result
/// with [`StageStatus::Failure`] instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("[{kind}] stage error: {message}")]
pub struct StageError {
    pub kind: String,
    pub message: String,
}

impl StageError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputResult {
    pub kind: String,
    pub status: StageStatus,
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl InputResult {
    pub fn success(kind: impl Into<String>, payload: Payload) -> Self {
        Self {
            kind: kind.into(),
            status: StageStatus::Success,
            payload,
            reason: None,
        }
    }

    pub fn failure(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            status: StageStatus::Failure,
            payload: Payload::Null,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionResult {
    pub kind: String,
    pub status: StageStatus,
    pub met: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ConditionResult {
    pub fn new(kind: impl Into<String>, met: bool) -> Self {
        Self {
            kind: kind.into(),
            status: StageStatus::Success,
            met,
            reason: None,
        }
    }

    pub fn failure(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            status: StageStatus::Failure,
            met: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformResult {
    pub kind: String,
    pub status: StageStatus,
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TransformResult {
    pub fn success(kind: impl Into<String>, payload: Payload) -> Self {
        Self {
            kind: kind.into(),
            status: StageStatus::Success,
            payload,
            reason: None,
        }
    }

    pub fn failure(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            status: StageStatus::Failure,
            payload: Payload::Null,
            reason: Some(reason.into()),
        }
    }
}

/// Loads the data a watch evaluates.
pub trait Input: Send + Sync + Debug {
    fn kind(&self) -> &str;

    fn execute<'a>(
        &'a self,
        ctx: &'a WatchExecutionContext,
    ) -> BoxFuture<'a, Result<InputResult, StageError>>;
}

/// Decides whether the watch's actions should run.
///
/// The input payload is available through [`WatchExecutionContext::payload`].
pub trait Condition: Send + Sync + Debug {
    fn kind(&self) -> &str;

    fn execute<'a>(
        &'a self,
        ctx: &'a WatchExecutionContext,
    ) -> BoxFuture<'a, Result<ConditionResult, StageError>>;
}

/// Reshapes the payload before actions see it.
pub trait Transform: Send + Sync + Debug {
    fn kind(&self) -> &str;

    fn execute<'a>(
        &'a self,
        ctx: &'a WatchExecutionContext,
        payload: &'a Payload,
    ) -> BoxFuture<'a, Result<TransformResult, StageError>>;
}

/// A side effect performed when the condition is met.
pub trait Action: Send + Sync + Debug {
    fn kind(&self) -> &str;

    /// Perform the side effect. The returned payload is stored in the
    /// action result.
    fn execute<'a>(
        &'a self,
        action_id: &'a str,
        ctx: &'a WatchExecutionContext,
        payload: &'a Payload,
    ) -> BoxFuture<'a, Result<Payload, StageError>>;

    /// Compute what the action would do without doing it.
    fn simulate<'a>(
        &'a self,
        _action_id: &'a str,
        _ctx: &'a WatchExecutionContext,
        _payload: &'a Payload,
    ) -> BoxFuture<'a, Result<Payload, StageError>> {
        Box::pin(async { Ok(Payload::Null) })
    }
}
