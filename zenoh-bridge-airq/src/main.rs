//! Zenoh bridge for AirQ RS-485 sensors.
//!
//! Polls CO2, temperature and humidity from AirQ nodes over Modbus RTU and
//! answers Zenoh queries with the latest fresh readings.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info, warn};
use zenoh_bridge_airq::config::AirqBridgeConfig;
use zenoh_bridge_airq::hub::SensorHub;
use zenoh_bridge_airq::scheduler::DeviceScheduler;
use zenoh_bridge_airq::sequencer::ReadSequencer;
use zenoh_bridge_airq::service::QueryService;
use zenoh_bridge_airq::status::BridgeStatus;
use zenoh_bridge_airq::transport::RtuTransport;

use airq_common::SensorKeyBuilder;

/// Zenoh bridge for AirQ sensors (Modbus RTU).
#[derive(Parser, Debug)]
#[command(name = "zenoh-bridge-airq")]
#[command(about = "Polls AirQ CO2/temperature/humidity sensors and serves them over Zenoh")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "airq.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = AirqBridgeConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Initialize logging
    let log_config = config
        .logging
        .clone()
        .with_level_override(args.log_level.as_deref());
    airq_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Starting zenoh-bridge-airq");
    info!("Loaded configuration from {:?}", args.config);

    let airq = &config.airq;
    let timing = airq.timing;
    let keys = SensorKeyBuilder::with_prefix(&airq.key_prefix);

    let status_key = keys.status_key();

    // Connect to Zenoh
    let session = airq_common::connect(&config.zenoh)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to Zenoh: {}", e))?;

    // Without the serial line there is nothing to poll
    let transport = match RtuTransport::open(&airq.serial, timing.read_timeout()) {
        Ok(transport) => transport,
        Err(e) => {
            error!(port = %airq.serial.port, error = %e, "Failed to open serial port");
            let status = BridgeStatus::serial_failure(&airq.serial.port, &e);
            if let Err(e) = status.publish(&session, &status_key).await {
                error!("Failed to publish bridge status: {}", e);
            }
            let _ = session.close().await;
            return Err(e).context("Serial connection failed");
        }
    };

    // Shared state
    let hub = SensorHub::new(timing.freshness_window());
    for address in airq.seed_addresses() {
        hub.add_address(address);
    }

    // Start polling
    let sequencer = ReadSequencer::new(hub.cache().clone(), airq.registers, timing.step_delay());
    let scheduler = DeviceScheduler::new(
        hub.registry().clone(),
        sequencer,
        transport,
        timing.scheduler_timing(),
    )
    .spawn();

    // Start serving queries
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let service = QueryService::new(
        session.clone(),
        hub.clone(),
        &airq.key_prefix,
        airq.serialization,
    );
    let service_task = tokio::spawn(service.run(shutdown_rx));

    info!(
        devices = hub.devices().len(),
        "AirQ bridge running"
    );

    // Publish bridge status
    let devices: Vec<u8> = hub.devices().into_iter().map(u8::from).collect();
    let status = BridgeStatus::running()
        .with("serial_port", airq.serial.port.clone())
        .with("baud_rate", airq.serial.baud_rate)
        .with("devices", devices);
    if let Err(e) = status.publish(&session, &status_key).await {
        error!("Failed to publish bridge status: {}", e);
    }

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);
    match service_task.await {
        Ok(Err(e)) => warn!(error = %e, "Query service ended with an error"),
        Err(e) => warn!(error = %e, "Query service task failed"),
        Ok(Ok(())) => {}
    }
    scheduler.shutdown().await;

    // Publish offline status
    let _ = BridgeStatus::offline().publish(&session, &status_key).await;

    session
        .close()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to close Zenoh session: {}", e))?;
    info!("AirQ bridge stopped");

    Ok(())
}
