// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `watcher`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "watcher",
    version,
    about = "Fire every configured watch once and print the resulting watch records.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Watcher.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Watcher.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `WATCHER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Maximum time to wait for all executions to finish.
    #[arg(long, value_name = "DURATION", default_value = "30s")]
    pub timeout: String,

    /// Parse + validate, print the watches, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
