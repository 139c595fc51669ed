// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `planexec`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "planexec",
    version,
    about = "Plan an objective as a DAG of steps and execute it wave by wave.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Planexec.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Planexec.toml")]
    pub config: String,

    /// The objective to plan and execute.
    ///
    /// May be omitted when resuming an existing run with `--run-id`.
    #[arg(long, value_name = "TEXT")]
    pub objective: Option<String>,

    /// Run id to start under, or to resume from its checkpoint.
    #[arg(long, value_name = "ID")]
    pub run_id: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PLANEXEC_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the plan and its waves, but run nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// List checkpointed runs and exit.
    #[arg(long, conflicts_with = "dry_run")]
    pub list_runs: bool,
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
