use anyhow::Result;
use clap::Parser;
use journal_process::{FileSink, OutputSink, TracingSink};
use journal_supervision::{SupervisorConfig, SupervisorRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Journal backend supervisor - launches the note-storage API and the
/// optional tool-exposure server, probes them for readiness, and keeps
/// them supervised until shutdown.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Append captured service output to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(args.debug)?;

    info!("Starting Journal backend supervisor");
    info!("Config file: {}", args.config);

    let config = SupervisorConfig::load_from_file(&args.config)?;
    info!("Loaded configuration for {} service(s)", config.services.len());

    let mut sinks: Vec<Arc<dyn OutputSink>> = vec![Arc::new(TracingSink)];
    if let Some(path) = args.log_file {
        info!("Capturing service output to {}", path.display());
        sinks.push(Arc::new(
            FileSink::new(path).map_err(|e| anyhow::anyhow!("log file: {}", e))?,
        ));
    }

    let registry = SupervisorRegistry::new(config, sinks)
        .map_err(|e| anyhow::anyhow!("registry construction failed: {}", e))?;

    // Mirror every state transition into the log, the way the desktop host
    // mirrors them into its menu and status panel.
    for name in registry.service_names() {
        let mut events = registry.subscribe(&name).expect("service just registered");
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event.failure {
                    Some(ref failure) => {
                        error!(service = %event.service, phase = %event.phase, %failure,
                               "service state changed");
                    }
                    None => {
                        info!(service = %event.service, phase = %event.phase,
                              endpoint = event.resolved_endpoint.as_deref().unwrap_or("-"),
                              "service state changed");
                    }
                }
            }
        });
    }

    if let Err(e) = registry.start_all().await {
        error!("Failed to start services: {}", e);
    }

    wait_for_shutdown_signal().await;

    info!("Shutting down services...");
    if let Err(e) = registry.stop_all().await {
        error!("Shutdown incomplete: {}", e);
        return Err(anyhow::anyhow!("shutdown failed: {}", e));
    }
    info!("All services stopped");

    Ok(())
}

fn initialize_logging(debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .init();

    Ok(())
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to create SIGTERM handler");
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .expect("failed to create SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT signal");
            }
        }
    }

    #[cfg(windows)]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C signal");
    }
}
