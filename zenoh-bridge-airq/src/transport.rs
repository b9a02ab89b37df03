//! Modbus register transport.
//!
//! The sequencer only needs two operations from the serial link: pick the
//! slave to talk to, and read holding registers from it. [`RegisterTransport`]
//! captures exactly that so the polling engine can run against a real RTU
//! session or a test double.

use std::future::Future;
use std::time::Duration;

use airq_common::{DeviceAddress, MetricKind};
use serde::{Deserialize, Serialize};
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tracing::{debug, info};

use crate::config::SerialConfig;

/// Error type for transport operations.
///
/// The polling engine only distinguishes success from failure; the variants
/// exist for logging.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Read failed: {0}")]
    Read(String),
    #[error("Modbus exception: {0}")]
    Exception(String),
    #[error("No response within {0:?}")]
    Timeout(Duration),
    #[error("Device returned no register data")]
    EmptyResponse,
}

/// A stateful, single-session Modbus client.
///
/// Implementations are not expected to be safe for interleaved use: the
/// selected device is session state, so only one read sequence may drive a
/// transport at a time.
pub trait RegisterTransport: Send {
    /// Make `address` the target of subsequent reads.
    fn select_device(&mut self, address: DeviceAddress);

    /// Read `count` holding registers starting at `register` from the selected device.
    fn read_register(
        &mut self,
        register: u16,
        count: u16,
    ) -> impl Future<Output = Result<Vec<u16>, TransportError>> + Send;
}

/// Holding register address for each metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterMap {
    #[serde(default = "default_co2_register")]
    pub co2: u16,
    #[serde(default = "default_temperature_register")]
    pub temperature: u16,
    #[serde(default = "default_humidity_register")]
    pub humidity: u16,
}

fn default_co2_register() -> u16 {
    MetricKind::Co2.default_register()
}

fn default_temperature_register() -> u16 {
    MetricKind::Temperature.default_register()
}

fn default_humidity_register() -> u16 {
    MetricKind::Humidity.default_register()
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self {
            co2: default_co2_register(),
            temperature: default_temperature_register(),
            humidity: default_humidity_register(),
        }
    }
}

impl RegisterMap {
    pub fn register_for(&self, metric: MetricKind) -> u16 {
        match metric {
            MetricKind::Co2 => self.co2,
            MetricKind::Temperature => self.temperature,
            MetricKind::Humidity => self.humidity,
        }
    }
}

/// Modbus RTU over a serial port.
pub struct RtuTransport {
    ctx: Context,
    read_timeout: Duration,
}

impl RtuTransport {
    /// Open the serial port and attach an RTU client to it.
    pub fn open(serial: &SerialConfig, read_timeout: Duration) -> Result<Self, TransportError> {
        let parity = match serial.parity.to_lowercase().as_str() {
            "even" => tokio_serial::Parity::Even,
            "odd" => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::None,
        };

        let stop_bits = match serial.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        };

        let data_bits = match serial.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };

        let builder = tokio_serial::new(&serial.port, serial.baud_rate)
            .parity(parity)
            .stop_bits(stop_bits)
            .data_bits(data_bits);

        let stream = tokio_serial::SerialStream::open(&builder).map_err(|e| {
            TransportError::Connection(format!("Serial open of {} failed: {}", serial.port, e))
        })?;

        info!(
            port = %serial.port,
            baud_rate = serial.baud_rate,
            "Connected"
        );

        Ok(Self {
            ctx: rtu::attach_slave(stream, Slave(DeviceAddress::MIN)),
            read_timeout,
        })
    }
}

impl RegisterTransport for RtuTransport {
    fn select_device(&mut self, address: DeviceAddress) {
        debug!(device = %address, "Selecting slave");
        self.ctx.set_slave(Slave(address.get()));
    }

    async fn read_register(
        &mut self,
        register: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let read_timeout = self.read_timeout;

        tokio::time::timeout(read_timeout, self.ctx.read_holding_registers(register, count))
            .await
            .map_err(|_| TransportError::Timeout(read_timeout))?
            .map_err(|e| TransportError::Read(e.to_string()))?
            .map_err(|e| TransportError::Exception(format!("{:?}", e)))
    }
}
