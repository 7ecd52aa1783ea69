// src/cli.rs

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::DEFAULT_CONFIG_FILE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Plan scheduling and checkpoint maintenance.
#[derive(Debug, Parser)]
#[command(name = "phasedag", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Overrides `PHASEDAG_LOG`.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the execution batches for the `[task.*]` table.
    Batches,

    /// Inspect or maintain the checkpoint store.
    Checkpoints {
        #[command(subcommand)]
        action: CheckpointCommand,
    },

    /// Print the summary of a persisted plan.
    Plan {
        /// JSON file written by `encode_plan`.
        file: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum CheckpointCommand {
    /// List checkpoints, newest first.
    List,
    /// Show aggregate statistics.
    Stats,
    /// Delete checkpoints older than the given age.
    Prune {
        #[arg(long)]
        older_than_days: u32,
    },
    /// Gzip a single checkpoint.
    Compress { id: String },
    /// Rebuild the index by scanning the storage directories.
    Rebuild,
    /// Apply the `[checkpoints]` retention settings.
    Retain,
}
