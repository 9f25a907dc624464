//! TaskQueue - admission-controlled task scheduling
//!
//! CLI entry point for driving synthetic workloads through the queues.

use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result, eyre};
use serde::Serialize;
use tracing::info;

use taskqueue::cli::{Cli, Command, OutputFormat};
use taskqueue::config::Config;
use taskqueue::workload::{QueueReport, RetryReport, Workload, run_concurrency, run_frequency, run_retry};

fn setup_logging(verbose: bool) -> Result<()> {
    // Logs go to stderr so reports on stdout stay machine-readable
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre!("Failed to install subscriber: {}", e))?;

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(cli.verbose).context("Failed to setup logging")?;

    // Load configuration
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Concurrency {
            tasks,
            concurrency,
            work_ms,
            fail_every,
        } => {
            if let Some(concurrency) = concurrency {
                config.concurrency.concurrency = concurrency;
            }
            let workload = Workload {
                tasks,
                work: Duration::from_millis(work_ms),
                fail_every,
            };
            let report = run_concurrency(&config.concurrency, &workload)
                .await
                .context("Failed to build concurrency queue")?;
            print_queue_report("concurrency", &report, cli.format)
        }
        Command::Frequency {
            tasks,
            frequency,
            window_ms,
            work_ms,
            fail_every,
        } => {
            if let Some(frequency) = frequency {
                config.frequency.frequency = frequency;
            }
            if let Some(window_ms) = window_ms {
                config.frequency.window_ms = window_ms;
            }
            let workload = Workload {
                tasks,
                work: Duration::from_millis(work_ms),
                fail_every,
            };
            let report = run_frequency(&config.frequency, &workload)
                .await
                .context("Failed to build frequency queue")?;
            print_queue_report("frequency", &report, cli.format)
        }
        Command::Retry {
            fail_times,
            retries,
            delay_ms,
            linear,
            cancel_after_ms,
        } => {
            if let Some(retries) = retries {
                config.retry.retries = retries;
            }
            if let Some(delay_ms) = delay_ms {
                config.retry.delay_ms = delay_ms;
            }
            if linear {
                config.retry.exponential = false;
            }
            let report = run_retry(&config.retry, fail_times, cancel_after_ms.map(Duration::from_millis)).await;
            print_retry_report(&report, cli.format)
        }
    }
}

fn print_json<T: Serialize>(report: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    println!("{}", json);
    Ok(())
}

fn print_queue_report(kind: &str, report: &QueueReport, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(report);
    }

    println!("{} {} queue drained in {}ms", "✓".green(), kind.bold(), report.elapsed_ms);
    println!("  succeeded:    {}", report.succeeded.to_string().green());
    let failed = report.failed.to_string();
    println!(
        "  failed:       {}",
        if report.failed > 0 { failed.red() } else { failed.normal() }
    );
    println!("  dispatched:   {}", report.stats.dispatched);
    println!("  peak pending: {}", report.stats.peak_pending);
    println!("  peak size:    {}", report.stats.peak_size);
    Ok(())
}

fn print_retry_report(report: &RetryReport, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(report);
    }

    let outcome = if report.outcome == "succeeded" {
        report.outcome.green()
    } else {
        report.outcome.yellow()
    };
    println!("retry {} after {} invocation(s)", outcome, report.invocations);
    println!("  elapsed: {}ms", report.elapsed_ms);
    Ok(())
}
