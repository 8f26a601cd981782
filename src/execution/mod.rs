// src/execution/mod.rs

pub mod context;
pub mod executor;
pub mod registry;
pub mod result;
pub mod service;
pub mod state;
pub mod throttle;
pub mod wid;

pub use context::{ContextKind, ExecutionProgress, ManualOptions, WatchExecutionContext};
pub use executor::{BoundedExecutor, ExecutionTask, RejectedExecution, WatchExecutor};
pub use registry::{CurrentExecutions, WatchExecutionSnapshot};
pub use result::{ActionResult, ActionResultStatus, WatchExecutionResult};
pub use service::{ExecutionService, ExecutionSettings};
pub use state::{ALL_ACTIONS, ActionExecutionMode, ExecutionPhase, ExecutionState};
pub use wid::Wid;
