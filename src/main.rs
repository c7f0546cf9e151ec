//! twinlink-device - demo device entry point
//!
//! Connects with the configured identity, acknowledges commands, reports the
//! telemetry interval and sends periodic readings until SIGINT/SIGTERM.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use twinlink::app::{device_callbacks, run_telemetry_loop};
use twinlink::clock::{wait_for_valid_time, SystemClock};
use twinlink::config::{DeviceConfig, DeviceCredentials};
use twinlink::observability::init_default_logging;
use twinlink::transport::mqtt::DeviceSession;

/// Device-side MQTT cloud messaging client
#[derive(Parser)]
#[command(name = "twinlink-device")]
#[command(about = "Device-side MQTT client for telemetry, device twin properties and commands")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "TWINLINK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the broker and run the demo device
    Run,
    /// Validate the configuration
    Config {
        /// Print the parsed configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting twinlink-device");

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_device(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<DeviceConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(DeviceConfig::load_from_file(path)?);
    }

    for path_str in ["device.toml", "config/device.toml"] {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(DeviceConfig::load_from_file(&path)?);
        }
    }

    Err("No configuration file found. Provide one with -c/--config or create device.toml".into())
}

async fn run_device(config: DeviceConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(device_id = %config.device.id, broker_url = %config.mqtt.broker_url, "Starting device");

    // Certificate validation needs a real clock
    if config.time_sync.enabled {
        let synced = wait_for_valid_time(
            &SystemClock,
            config.time_sync.max_attempts,
            config.time_sync.retry_delay(),
        )
        .await;
        if !synced {
            warn!("Connecting with an unsynchronized clock; TLS may fail");
        }
    }

    let credentials = DeviceCredentials::load(&config.mqtt)?;

    let (interval_tx, interval_rx) = watch::channel(config.telemetry_interval());
    let mut session = DeviceSession::start(&config, &credentials, device_callbacks(interval_tx))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let telemetry = tokio::spawn(run_telemetry_loop(session.engine(), interval_rx, shutdown_rx));

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!("Device is running");

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = telemetry.await {
        warn!(error = %e, "Telemetry task ended abnormally");
    }

    let metrics = session.engine().lock().await.metrics().snapshot();
    info!(metrics = %serde_json::to_string(&metrics)?, "Final engine metrics");

    session.shutdown().await?;
    Ok(())
}

fn handle_config_command(config: &DeviceConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!(device_id = %config.device.id, "Configuration validation complete");
    Ok(())
}
