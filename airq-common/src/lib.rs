//! AirQ Common Library
//!
//! Shared types and utilities for the AirQ RS-485 sensor bridge and its consumers:
//!
//! - [`device`] - Validated RS-485 slave addresses (`DeviceAddress`)
//! - [`metric`] - Sensor metrics and their fixed holding registers (`MetricKind`)
//! - [`sample`] - The `SensorValue` payload returned to consumers
//! - [`keyexpr`] - Key expression builders and parsers
//! - [`serialization`] - JSON/CBOR encoding and decoding
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`session`] - Zenoh session management
//! - [`error`] - Error types

pub mod config;
pub mod device;
pub mod error;
pub mod keyexpr;
pub mod metric;
pub mod sample;
pub mod serialization;
pub mod session;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, ZenohConfig, load_config, parse_config};
pub use device::{AddressError, DeviceAddress};
pub use error::{Error, Result};
pub use keyexpr::{KEY_PREFIX, ParsedSensorKey, SensorKeyBuilder, parse_sensor_key};
pub use metric::{CO2_REGISTER, HUMIDITY_REGISTER, MetricKind, TEMPERATURE_REGISTER};
pub use sample::SensorValue;
pub use serialization::{Format, decode, decode_auto, encode};
pub use session::connect;

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level. Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
