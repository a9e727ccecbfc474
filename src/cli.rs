// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::GcMethod;

/// Command-line arguments for `swarmstate`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "swarmstate",
    version,
    about = "Crash-recoverable lifecycle manager for swarm tasks, files and devices.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Swarmstate.toml` in the current working directory, if it
    /// exists.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Journal root directory; overrides `[manager].state_dir`.
    #[arg(long, value_name = "DIR")]
    pub state_dir: Option<String>,

    /// Exclusive device units; overrides `[manager].devices`.
    #[arg(long, value_name = "N")]
    pub devices: Option<usize>,

    /// Garbage collection method (none, ref_count, on_demand, force);
    /// overrides `[gc].method`.
    #[arg(long, value_name = "METHOD")]
    pub gc: Option<GcMethod>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SWARMSTATE_LOG` or `info` is used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Recover the journal, print what was found, and exit without
    /// rewriting any record.
    #[arg(long)]
    pub check: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
