//! Backup Orchestrator - Main entry point
//!
//! Invoked once per cadence by the scheduler, e.g. `backup-orchestrator daily`.

use anyhow::Result;
use backup_orchestrator::{tools::Tools, utils, Cadence, Config, Orchestrator};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

/// Exit status for errors that stopped the run before any project finished.
const EXIT_FATAL: u8 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Cadence to run (minutely, hourly, daily, weekly, monthly, yearly)
    cadence: Cadence,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Top-level manifest (overrides config)
    #[arg(short, long, value_name = "FILE")]
    manifest: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("Backup run aborted: {:#}", e);
            eprintln!("FAIL: {e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(args: Args) -> Result<u8> {
    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(manifest) = args.manifest {
        config.paths.manifest = manifest;
    }

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting backup-orchestrator v{} ({} run)",
        env!("CARGO_PKG_VERSION"),
        args.cadence
    );

    let tools = Tools::from_config(&config.tools);
    let report = Orchestrator::new(&config, &tools).run(args.cadence).await?;
    Ok(report.exit_code())
}
