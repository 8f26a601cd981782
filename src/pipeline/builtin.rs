// src/pipeline/builtin.rs

//! Small built-in stages.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::execution::WatchExecutionContext;
use crate::types::{BoxFuture, Payload};

use super::{
    Action, Condition, ConditionResult, Input, InputResult, StageError, Transform,
    TransformResult,
};

static NULL: Payload = Payload::Null;

/// Look up a dot-separated path (`"hits.total"`, `"items.0.name"`) in a
/// payload. Array segments are numeric indices.
pub fn lookup_path<'a>(payload: &'a Payload, path: &str) -> Option<&'a Payload> {
    if path.is_empty() {
        return Some(payload);
    }
    path.split('.').try_fold(payload, |current, segment| match current {
        Payload::Object(map) => map.get(segment),
        Payload::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Input returning a static payload.
#[derive(Debug, Clone)]
pub struct SimpleInput {
    payload: Payload,
}

impl SimpleInput {
    pub const KIND: &'static str = "simple";

    pub fn new(payload: Payload) -> Self {
        Self { payload }
    }
}

impl Input for SimpleInput {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn execute<'a>(
        &'a self,
        _ctx: &'a WatchExecutionContext,
    ) -> BoxFuture<'a, Result<InputResult, StageError>> {
        Box::pin(async move { Ok(InputResult::success(Self::KIND, self.payload.clone())) })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysCondition;

impl AlwaysCondition {
    pub const KIND: &'static str = "always";
}

impl Condition for AlwaysCondition {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn execute<'a>(
        &'a self,
        _ctx: &'a WatchExecutionContext,
    ) -> BoxFuture<'a, Result<ConditionResult, StageError>> {
        Box::pin(async { Ok(ConditionResult::new(Self::KIND, true)) })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCondition;

impl NeverCondition {
    pub const KIND: &'static str = "never";
}

impl Condition for NeverCondition {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn execute<'a>(
        &'a self,
        _ctx: &'a WatchExecutionContext,
    ) -> BoxFuture<'a, Result<ConditionResult, StageError>> {
        Box::pin(async { Ok(ConditionResult::new(Self::KIND, false)) })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eq" => Ok(CompareOp::Eq),
            "not_eq" => Ok(CompareOp::NotEq),
            "gt" => Ok(CompareOp::Gt),
            "gte" => Ok(CompareOp::Gte),
            "lt" => Ok(CompareOp::Lt),
            "lte" => Ok(CompareOp::Lte),
            other => Err(format!(
                "unknown compare op [{other}] (expected eq, not_eq, gt, gte, lt or lte)"
            )),
        }
    }
}

/// Compares the value at `path` in the input payload against a constant.
#[derive(Debug, Clone)]
pub struct CompareCondition {
    path: String,
    op: CompareOp,
    value: Payload,
}

impl CompareCondition {
    pub const KIND: &'static str = "compare";

    pub fn new(path: impl Into<String>, op: CompareOp, value: Payload) -> Self {
        Self {
            path: path.into(),
            op,
            value,
        }
    }

    fn evaluate(&self, resolved: &Payload) -> Result<bool, String> {
        let ordering = || {
            compare_values(resolved, &self.value).ok_or_else(|| {
                format!(
                    "cannot order [{}] against [{}] at path [{}]",
                    resolved, self.value, self.path
                )
            })
        };
        Ok(match self.op {
            CompareOp::Eq => resolved == &self.value,
            CompareOp::NotEq => resolved != &self.value,
            CompareOp::Gt => ordering()? == Ordering::Greater,
            CompareOp::Gte => ordering()? != Ordering::Less,
            CompareOp::Lt => ordering()? == Ordering::Less,
            CompareOp::Lte => ordering()? != Ordering::Greater,
        })
    }
}

fn compare_values(left: &Payload, right: &Payload) -> Option<Ordering> {
    match (left, right) {
        (Payload::Number(l), Payload::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Payload::String(l), Payload::String(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

impl Condition for CompareCondition {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a WatchExecutionContext,
    ) -> BoxFuture<'a, Result<ConditionResult, StageError>> {
        Box::pin(async move {
            let payload = ctx.payload();
            let resolved = lookup_path(payload, &self.path).unwrap_or(&NULL);
            match self.evaluate(resolved) {
                Ok(met) => Ok(ConditionResult::new(Self::KIND, met)),
                Err(reason) => Ok(ConditionResult::failure(Self::KIND, reason)),
            }
        })
    }
}

/// Replaces the payload with the value found at `path`.
#[derive(Debug, Clone)]
pub struct SelectTransform {
    path: String,
}

impl SelectTransform {
    pub const KIND: &'static str = "select";

    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Transform for SelectTransform {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn execute<'a>(
        &'a self,
        _ctx: &'a WatchExecutionContext,
        payload: &'a Payload,
    ) -> BoxFuture<'a, Result<TransformResult, StageError>> {
        Box::pin(async move {
            match lookup_path(payload, &self.path) {
                Some(selected) => Ok(TransformResult::success(Self::KIND, selected.clone())),
                None => Ok(TransformResult::failure(
                    Self::KIND,
                    format!("path [{}] not found in payload", self.path),
                )),
            }
        })
    }
}

/// Logs a rendered message through `tracing`.
///
/// The text may reference `{{ctx.watch_id}}`, `{{ctx.wid}}`,
/// `{{ctx.payload}}` and `{{ctx.payload.<path>}}`.
#[derive(Debug, Clone)]
pub struct LoggingAction {
    text: String,
}

impl LoggingAction {
    pub const KIND: &'static str = "logging";

    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn render(&self, ctx: &WatchExecutionContext, payload: &Payload) -> String {
        let mut out = String::with_capacity(self.text.len());
        let mut rest = self.text.as_str();

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            };
            let key = after[..end].trim();
            out.push_str(&resolve_placeholder(key, ctx, payload));
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        out
    }
}

fn resolve_placeholder(key: &str, ctx: &WatchExecutionContext, payload: &Payload) -> String {
    let value = match key {
        "ctx.watch_id" => return ctx.watch().id.clone(),
        "ctx.wid" => return ctx.id().to_string(),
        "ctx.execution_time" => return ctx.execution_time().to_rfc3339(),
        "ctx.payload" => Some(payload),
        other => other
            .strip_prefix("ctx.payload.")
            .and_then(|path| lookup_path(payload, path)),
    };
    match value {
        Some(Payload::String(s)) => s.clone(),
        Some(v) => v.to_string(),
        None => String::new(),
    }
}

impl Action for LoggingAction {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn execute<'a>(
        &'a self,
        action_id: &'a str,
        ctx: &'a WatchExecutionContext,
        payload: &'a Payload,
    ) -> BoxFuture<'a, Result<Payload, StageError>> {
        Box::pin(async move {
            let message = self.render(ctx, payload);
            info!(watch_id = %ctx.watch().id, action = %action_id, "{}", message);
            Ok(serde_json::json!({ "logged_text": message }))
        })
    }

    fn simulate<'a>(
        &'a self,
        _action_id: &'a str,
        ctx: &'a WatchExecutionContext,
        payload: &'a Payload,
    ) -> BoxFuture<'a, Result<Payload, StageError>> {
        Box::pin(async move {
            Ok(serde_json::json!({ "logged_text": self.render(ctx, payload) }))
        })
    }
}
