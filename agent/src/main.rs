// File-sync agent entry point
// Runs one sync cycle (or, with --watch, one cycle per poll interval).

use anyhow::{Context, Result};
use clap::Parser;
use common::bootstrap;
use common::config::{Settings, DEFAULT_CONFIG_FILE};
use common::sync::SyncRunner;
use common::telemetry;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Syncs new datasets found in the configured file source
#[derive(Debug, Parser)]
#[command(name = "file-sync", version)]
struct Args {
    /// Configuration file path
    #[arg(long, env = "FILE_SYNC_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config_file: PathBuf,

    /// Type of persistent storage, e.g. s3
    #[arg(long, default_value = "s3")]
    file_source: String,

    /// Keep running, one cycle every poll interval, until Ctrl+C
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let settings = Settings::load(&args.config_file, &args.file_source);
    let observability = settings
        .as_ref()
        .map(|s| s.observability.clone())
        .unwrap_or_default();
    if let Err(e) = telemetry::init_logging(&observability) {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    match run(&args, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "File sync failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args, settings: Result<Settings, config::ConfigError>) -> Result<()> {
    info!(
        config_file = %args.config_file.display(),
        file_source = %args.file_source,
        "Launching file sync"
    );

    let settings = settings.context("Failed to load configuration")?;
    settings
        .validate()
        .map_err(|reason| anyhow::anyhow!("Invalid configuration: {}", reason))?;

    info!(
        watermark_file = %settings.agent.watermark_file.display(),
        workflow = %settings.agent.workflow,
        backend_url = %settings.agent.backend_url,
        "Configuration loaded"
    );

    if let Some(port) = settings.observability.metrics_port {
        telemetry::init_metrics(port)?;
    }

    let orchestrator = bootstrap::init_orchestrator(&settings, &args.file_source)?;

    if !args.watch {
        let report = orchestrator.run_cycle().await?;
        info!(
            batch_id = %report.batch_id,
            created = report.created(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Run complete"
        );
        return Ok(());
    }

    let runner = SyncRunner::new(
        Arc::new(orchestrator),
        Duration::from_secs(settings.agent.poll_interval_seconds),
    );

    let shutdown = runner.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C signal, stopping after the current cycle");
                let _ = shutdown.send(());
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    runner.start().await;
    info!("File sync stopped");
    Ok(())
}
