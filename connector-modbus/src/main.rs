//! Modbus pull connector.
//!
//! Polls Modbus devices and publishes decoded register values to Zenoh.

use anyhow::{Context, Result};
use clap::Parser;
use connector_common::{KeyExprBuilder, LoggingConfig};
use connector_modbus::config::ModbusConnectorConfig;
use connector_modbus::connector::ModbusConnector;
use connector_modbus::poller::ModbusPoller;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// How long pollers get to close their device connections on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Modbus pull connector for time-series pipelines.
#[derive(Parser, Debug)]
#[command(name = "connector-modbus")]
#[command(about = "Polls Modbus devices and publishes tagged measurements to Zenoh")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "modbus.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ModbusConnectorConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    connector_common::init_tracing(&log_config).context("Failed to init tracing")?;

    info!("Starting connector-modbus");
    info!("Loaded configuration from {:?}", args.config);

    let session = connector_common::connect(&config.zenoh)
        .await
        .context("Failed to connect to Zenoh")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    for device in &config.modbus.devices {
        let connector = ModbusConnector::from_config(device);
        let poller = ModbusPoller::new(
            connector,
            device.connector.poll_interval(),
            &config.modbus.key_prefix,
            session.clone(),
            config.serialization,
        );

        info!(
            "Starting poller for device '{}' ({}, {})",
            device.name,
            device.connector.endpoint(),
            device.connector.endianness
        );

        tasks.push(tokio::spawn(poller.run(shutdown_rx.clone())));
    }

    info!(
        "Modbus connector running with {} device(s)",
        config.modbus.devices.len()
    );

    let status_key = KeyExprBuilder::with_prefix(&config.modbus.key_prefix).status_key();
    let status = serde_json::json!({
        "connector": "modbus",
        "version": env!("CARGO_PKG_VERSION"),
        "devices": config.modbus.devices.iter().map(|d| &d.name).collect::<Vec<_>>(),
        "status": "running"
    });

    if let Err(e) = session.put(&status_key, status.to_string()).await {
        error!("Failed to publish connector status: {}", e);
    }

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);
    for mut task in tasks {
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Poller task failed: {}", e),
            Err(_) => {
                warn!("Poller did not stop within {:?}, aborting", SHUTDOWN_GRACE);
                task.abort();
            }
        }
    }

    let status = serde_json::json!({
        "connector": "modbus",
        "status": "offline"
    });
    let _ = session.put(&status_key, status.to_string()).await;

    session
        .close()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to close Zenoh session: {}", e))?;
    info!("Modbus connector stopped");

    Ok(())
}
