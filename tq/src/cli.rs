//! CLI command definitions and subcommands

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// TaskQueue - admission-controlled task scheduling
#[derive(Parser)]
#[command(
    name = "tq",
    about = "Drive synthetic workloads through concurrency and frequency queues",
    version,
    after_help = "Set RUST_LOG=taskqueue=debug to trace every dispatch."
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run tasks through a queue bounded by tasks in flight
    Concurrency {
        /// Number of tasks to add
        #[arg(short, long, default_value = "20")]
        tasks: usize,

        /// Maximum tasks in flight (defaults to the config value)
        #[arg(short = 'n', long)]
        concurrency: Option<usize>,

        /// Base work time per task in milliseconds
        #[arg(short, long, default_value = "50")]
        work_ms: u64,

        /// Make every n-th task fail
        #[arg(long)]
        fail_every: Option<usize>,
    },

    /// Run tasks through a queue bounded by starts per window
    Frequency {
        /// Number of tasks to add
        #[arg(short, long, default_value = "20")]
        tasks: usize,

        /// Maximum starts per window (defaults to the config value)
        #[arg(short = 'n', long)]
        frequency: Option<usize>,

        /// Window length in milliseconds (defaults to the config value)
        #[arg(long)]
        window_ms: Option<u64>,

        /// Base work time per task in milliseconds
        #[arg(short, long, default_value = "10")]
        work_ms: u64,

        /// Make every n-th task fail
        #[arg(long)]
        fail_every: Option<usize>,
    },

    /// Retry an operation that fails a given number of times
    Retry {
        /// How many times the operation fails before succeeding
        #[arg(long, default_value = "1")]
        fail_times: u32,

        /// Extra attempts after the first (defaults to the config value)
        #[arg(short, long)]
        retries: Option<u32>,

        /// Base delay in milliseconds (defaults to the config value)
        #[arg(short, long)]
        delay_ms: Option<u64>,

        /// Use a fixed delay instead of doubling it
        #[arg(long)]
        linear: bool,

        /// Cancel the retry after this many milliseconds
        #[arg(long)]
        cancel_after_ms: Option<u64>,
    },
}

/// Output format for reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
