// src/logging.rs

//! Logging setup for `watcher` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `WATCHER_LOG` environment variable: either a bare level ("debug") or a
//!    full `EnvFilter` directive ("watcher::execution=trace,info")
//! 3. default to `info`
//!
//! A bare level only applies to this crate; dependencies stay at `warn`.
//!
//! Logs are sent to STDERR so that stdout only carries the JSON records.

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "WATCHER_LOG";

/// Target prefix of every event emitted by this crate.
const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV_VAR).ok();
    let directive = filter_directive(cli_level, env.as_deref());
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("invalid log filter '{directive}' (from {LOG_ENV_VAR})"))?;

    // Worker thread names end up in execution snapshots; keep them in logs too.
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}

/// Build the `EnvFilter` directive from the CLI flag and the raw value of
/// `WATCHER_LOG`.
pub fn filter_directive(cli_level: Option<LogLevel>, env: Option<&str>) -> String {
    let scoped =
        |level: tracing::Level| format!("warn,{CRATE_TARGET}={}", level.as_str().to_lowercase());

    if let Some(lvl) = cli_level {
        return scoped(level_from_log_level(lvl));
    }
    match env.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => match parse_level_str(raw) {
            Some(level) => scoped(level),
            None => raw.to_string(),
        },
        None => scoped(tracing::Level::INFO),
    }
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

pub fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
