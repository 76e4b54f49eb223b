use anyhow::Context;
use clap::Parser;
use spoolwatch::{init_logging, monitor_config, Config, PrinterMonitor, BUILD_DATE, VERSION};
use std::path::PathBuf;
use std::sync::Arc;

/// Watch networked 3D printers and report telemetry and finished jobs
#[derive(Debug, Parser)]
#[command(name = "spoolwatch", version)]
struct Cli {
    /// Configuration file (TOML or JSON); defaults to the platform config directory
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if cli.json_logs {
        config.logging.json = true;
    }
    init_logging(&config.logging)?;

    tracing::info!(version = VERSION, built = BUILD_DATE, "Starting spoolwatch");

    let tuning = monitor_config(&config);
    let mut monitors = Vec::with_capacity(config.printers.len());

    for printer in &config.printers {
        let name = Arc::<str>::from(printer.display_name());
        let monitor = PrinterMonitor::new(printer.to_link_config(), tuning);

        let label = name.clone();
        monitor.on_message("log", move |snapshot| {
            tracing::debug!(
                printer = %label,
                status = %snapshot.status,
                progress = snapshot.progress.percent,
                nozzle_left = snapshot.temperatures.left_nozzle,
                nozzle_right = snapshot.temperatures.right_nozzle,
                bed = snapshot.temperatures.bed,
                "Snapshot"
            );
        });

        let label = name.clone();
        monitor.on_completion("log", move |record| {
            let report = serde_json::to_string(record).unwrap_or_default();
            tracing::info!(
                printer = %label,
                outcome = %record.outcome,
                grams = record.total_actual_weight(),
                record = %report,
                "Job finished"
            );
        });

        match monitor.start().await {
            Ok(()) => tracing::info!(printer = %name, serial = monitor.serial(), "Monitoring"),
            Err(e) => tracing::error!(printer = %name, error = %e, "Failed to start monitor"),
        }
        monitors.push(monitor);
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("Shutting down");

    for monitor in &monitors {
        monitor.stop().await;
    }

    Ok(())
}
