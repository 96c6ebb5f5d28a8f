// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `shepherd`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "shepherd",
    version,
    about = "Run actions and services as one dependency-ordered workflow.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the workflow config (YAML).
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: PathBuf,

    /// Writable directory for this run; relative output paths resolve here.
    ///
    /// Default: the current working directory.
    #[arg(long, value_name = "PATH")]
    pub run_dir: Option<PathBuf>,

    /// Directory the supervised programs run from; relative `state.file`
    /// paths resolve here.
    #[arg(long, value_name = "PATH")]
    pub work_dir: Option<PathBuf>,

    /// Path to shepherd's own log file. Overrides `output.stdout` from the
    /// config; without either, logs go to stderr.
    #[arg(long, value_name = "PATH")]
    pub log: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SHEPHERD_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the program graph, but don't execute
    /// anything.
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
