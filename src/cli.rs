// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::config::DEFAULT_CONFIG_FILE;

/// Command-line arguments for `buildgraph`.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "buildgraph",
    version,
    about = "Run the tasks in a TOML build file in dependency order.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the build file (TOML).
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Task to run, together with everything it depends on. Repeatable.
    ///
    /// Defaults to `[config].default_tasks`, or every task if that is empty.
    #[arg(long = "task", value_name = "NAME")]
    pub tasks: Vec<String>,

    /// Keep this task in the plan but do not run it. Repeatable.
    #[arg(short = 'x', long = "exclude", value_name = "NAME")]
    pub exclude: Vec<String>,

    /// Override `[config].workers`.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Keep running independent tasks after a failure.
    #[arg(long = "continue")]
    pub keep_going: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BUILDGRAPH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Build and validate the plan, print it, but don't execute any commands.
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
