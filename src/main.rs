mod cli;
mod logging;
mod reporter;

use std::path::Path;
use std::process;

use anyhow::Context;
use chrono::Utc;
use clap::{CommandFactory, Parser};
use cli::{BatchArgs, Cli, Commands};
use colored::*;
use dotenv::dotenv;
use reporter::CliReporter;
use stream_cache::signal::Signals;
use stream_cache::{batch, AppConfig, BatchSummary, Daemon, Error, InstanceLock, Mover};
use tracing::error;

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let args = Cli::parse();

    let config = match AppConfig::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let result = match args.command {
        Some(Commands::Daemon) => run_daemon(&args.config, config),
        Some(Commands::MoveTracked(batch_args)) => {
            run_batch(&config, &batch_args, batch::move_tracked)
        }
        Some(Commands::MoveOther(batch_args)) => run_batch(&config, &batch_args, batch::move_other),
        Some(Commands::MoveAll(batch_args)) => run_batch(&config, &batch_args, batch::move_all),
        Some(Commands::Status) => print_status(&config),
        Some(Commands::PrintConfig) => config
            .to_toml()
            .map(|rendered| println!("{}", rendered))
            .map_err(anyhow::Error::from),
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn acquire_lock(config: &AppConfig) -> anyhow::Result<InstanceLock> {
    match InstanceLock::acquire(&config.lock_file) {
        Err(Error::LockHeld(path)) => {
            anyhow::bail!("Another instance is already running (lock {})", path.display())
        }
        other => other.context("Could not take the instance lock"),
    }
}

fn run_daemon(config_path: &Path, config: AppConfig) -> anyhow::Result<()> {
    let _lock = acquire_lock(&config)?;
    let signals = Signals::install().context("Could not install signal handlers")?;
    let mut daemon = Daemon::new(config_path, config, signals)?;
    daemon.run();
    Ok(())
}

fn run_batch(
    config: &AppConfig,
    args: &BatchArgs,
    command: fn(&Mover, &dyn stream_cache::ProgressReporter) -> BatchSummary,
) -> anyhow::Result<()> {
    let _lock = acquire_lock(config)?;
    let mover = Mover::from_config(config);

    let summary = if args.json {
        command(&mover, &stream_cache::SilentReporter)
    } else {
        command(&mover, &CliReporter::new())
    };

    if args.json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        print_summary(&summary);
    }

    if !summary.success {
        process::exit(1);
    }
    Ok(())
}

fn print_summary(summary: &BatchSummary) {
    let headline = if summary.success {
        summary.message.green()
    } else {
        summary.message.red()
    };
    println!("{}", headline);
    println!(
        "{} moved, {} deleted as duplicate, {} skipped",
        format!("{}", summary.moved).green(),
        format!("{}", summary.deleted).cyan(),
        format!("{}", summary.skipped).yellow(),
    );
    for name in &summary.errors {
        println!("  {} {}", "failed:".red(), name);
    }
}

fn print_status(config: &AppConfig) -> anyhow::Result<()> {
    let ledger = stream_cache::Ledger::new(&config.ledger_file);
    let entries = ledger
        .load()
        .with_context(|| format!("Could not read {}", ledger.path().display()))?;

    let now = Utc::now().timestamp();
    for (path, cached_at) in &entries {
        let age_hours = (now - cached_at).max(0) as f64 / 3600.0;
        let marker = if path.exists() {
            "cached".green()
        } else {
            "missing".red()
        };
        println!("{:>8} {:>8.1}h  {}", marker, age_hours, path.display());
    }
    println!(
        "{} tracked files, cleanup mode {:?}",
        format!("{}", entries.len()).cyan(),
        config.cleanup_mode
    );
    Ok(())
}
