// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! Five commands per the external-interfaces contract: `run`, `validate`,
//! `hash`, `resume`, `plugins list`. Flags are command-scoped and strict —
//! clap rejects unknown flags by default, which is the behavior the
//! contract requires.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `taskgraph`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskgraph",
    version,
    about = "Deterministic task-graph execution engine.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the graph document (JSON).
    #[arg(long, global = true, value_name = "PATH", default_value = "graph.json")]
    pub graph: PathBuf,

    /// Working directory tasks resolve inputs/outputs/commands against.
    /// Relative paths on every other flag resolve under this directory,
    /// except `hash`, whose output must be independent of it.
    #[arg(long, global = true, value_name = "PATH", default_value = ".")]
    pub work_dir: PathBuf,

    /// Directory for the on-disk run/checkpoint/failure records.
    #[arg(long, global = true, value_name = "PATH", default_value = ".taskgraph/runs")]
    pub recovery_dir: PathBuf,

    /// Directory for the on-disk content-addressed cache.
    #[arg(long, global = true, value_name = "PATH", default_value = ".taskgraph/cache")]
    pub cache_dir: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKGRAPH_LOG` or a default level is used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Execute the graph against the working directory.
    Run {
        /// Number of concurrent workers. 1 forces the serial executor.
        #[arg(long, default_value_t = 1)]
        workers: usize,

        /// Treat this as an incremental run (consult a prior snapshot for
        /// invalidation) rather than a clean run.
        #[arg(long)]
        incremental: bool,
    },
    /// Parse and validate the graph document; do not execute anything.
    Validate,
    /// Print the graph hash. Output is independent of `--work-dir`.
    Hash,
    /// Resume a previous run, reconstructing a plan from its checkpoints.
    Resume {
        /// The previous run's id.
        #[arg(long, value_name = "RUN_ID")]
        previous_run_id: String,

        /// Number of concurrent workers. 1 forces the serial executor.
        #[arg(long, default_value_t = 1)]
        workers: usize,

        /// Narrow execution to nodes that failed in the previous run.
        /// Cache presence is still always consulted (§9): this never
        /// forces re-execution of a node whose cache entry is valid.
        #[arg(long)]
        failed_only: bool,
    },
    /// Inspect the registered observer/hook capabilities.
    Plugins {
        #[command(subcommand)]
        action: PluginsAction,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum PluginsAction {
    /// List registered observers.
    List,
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
