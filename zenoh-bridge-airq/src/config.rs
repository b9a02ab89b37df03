//! Configuration for the AirQ bridge.

use std::path::Path;
use std::time::Duration;

use airq_common::config::{LoggingConfig, ZenohConfig};
use airq_common::{DeviceAddress, Format, KEY_PREFIX, MetricKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduler::SchedulerTiming;
use crate::transport::RegisterMap;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] airq_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirqBridgeConfig {
    /// Zenoh connection settings
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Sensor bus settings
    #[serde(default)]
    pub airq: AirqConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Sensor bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirqConfig {
    /// Key expression prefix (default: "airq")
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Encoding of query replies
    #[serde(default)]
    pub serialization: Format,

    /// Serial line the sensors hang off
    #[serde(default)]
    pub serial: SerialConfig,

    /// Devices registered at startup
    #[serde(default)]
    pub devices: Vec<u64>,

    /// Holding register per metric
    #[serde(default)]
    pub registers: RegisterMap,

    #[serde(default)]
    pub timing: TimingConfig,
}

fn default_key_prefix() -> String {
    KEY_PREFIX.to_string()
}

impl Default for AirqConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            serialization: Format::default(),
            serial: SerialConfig::default(),
            devices: Vec::new(),
            registers: RegisterMap::default(),
            timing: TimingConfig::default(),
        }
    }
}

/// RS-485 serial line settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial port path (default: "/dev/ttyS1")
    #[serde(default = "default_port")]
    pub port: String,
    /// Baud rate (default: 9600)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Data bits (default: 8)
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Parity: "none", "even", or "odd" (default: "none")
    #[serde(default = "default_parity")]
    pub parity: String,
    /// Stop bits: 1 or 2 (default: 1)
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
}

fn default_port() -> String {
    "/dev/ttyS1".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            parity: default_parity(),
            stop_bits: default_stop_bits(),
        }
    }
}

const MAX_STEP_DELAY_MS: u64 = 60_000;
const MAX_DEVICE_BUDGET_SECS: u64 = 3600;
const MAX_IDLE_BACKOFF_SECS: u64 = 3600;
const MAX_FRESHNESS_SECS: u64 = 86_400;
const MAX_READ_TIMEOUT_MS: u64 = 60_000;

/// Polling timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Delay between two register reads of one device
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    /// Slot reserved for each device within a cycle
    #[serde(default = "default_device_budget_secs")]
    pub device_budget_secs: u64,
    /// Re-check interval while no device is registered
    #[serde(default = "default_idle_backoff_secs")]
    pub idle_backoff_secs: u64,
    /// Maximum age of a reading served to consumers
    #[serde(default = "default_freshness_secs")]
    pub freshness_secs: u64,
    /// Bound on a single register read
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_step_delay_ms() -> u64 {
    2000
}

fn default_device_budget_secs() -> u64 {
    15
}

fn default_idle_backoff_secs() -> u64 {
    10
}

fn default_freshness_secs() -> u64 {
    120
}

fn default_read_timeout_ms() -> u64 {
    1000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay_ms(),
            device_budget_secs: default_device_budget_secs(),
            idle_backoff_secs: default_idle_backoff_secs(),
            freshness_secs: default_freshness_secs(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl TimingConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn device_budget(&self) -> Duration {
        Duration::from_secs(self.device_budget_secs)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_secs(self.idle_backoff_secs)
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Longest a full sequence can take when every read times out at the last moment.
    pub fn worst_case_sequence(&self) -> Duration {
        let steps = MetricKind::SEQUENCE.len() as u32;
        self.step_delay()
            .saturating_mul(steps - 1)
            .saturating_add(self.read_timeout().saturating_mul(steps))
    }

    pub fn scheduler_timing(&self) -> SchedulerTiming {
        SchedulerTiming {
            device_budget: self.device_budget(),
            idle_backoff: self.idle_backoff(),
        }
    }
}

impl AirqBridgeConfig {
    /// Load and validate configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: AirqBridgeConfig = airq_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a JSON5 string.
    pub fn from_json5(content: &str) -> Result<Self, ConfigError> {
        let config: AirqBridgeConfig = airq_common::parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let airq = &self.airq;

        if airq.key_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "key_prefix cannot be empty".to_string(),
            ));
        }

        for &id in &airq.devices {
            if DeviceAddress::try_from(id).is_err() {
                return Err(ConfigError::Validation(format!(
                    "Device {} is out of range (use {} - {})",
                    id,
                    DeviceAddress::MIN,
                    DeviceAddress::MAX
                )));
            }
        }

        airq.serial.validate()?;
        airq.timing.validate()?;

        Ok(())
    }
}

impl AirqConfig {
    /// Seed addresses, deduplicated, in configured order.
    ///
    /// Entries outside 1 - 255 are skipped; [`AirqBridgeConfig::validate`]
    /// rejects them up front.
    pub fn seed_addresses(&self) -> Vec<DeviceAddress> {
        let mut seeds = Vec::with_capacity(self.devices.len());
        for address in self
            .devices
            .iter()
            .filter_map(|&id| DeviceAddress::try_from(id).ok())
        {
            if !seeds.contains(&address) {
                seeds.push(address);
            }
        }
        seeds
    }
}

impl SerialConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.port.is_empty() {
            return Err(ConfigError::Validation(
                "Serial port cannot be empty".to_string(),
            ));
        }

        if self.baud_rate == 0 {
            return Err(ConfigError::Validation(
                "Serial baud_rate must be non-zero".to_string(),
            ));
        }

        match self.parity.to_lowercase().as_str() {
            "none" | "even" | "odd" => {}
            _ => {
                return Err(ConfigError::Validation(format!(
                    "Invalid parity '{}' (use none, even, or odd)",
                    self.parity
                )));
            }
        }

        if !(5..=8).contains(&self.data_bits) {
            return Err(ConfigError::Validation(format!(
                "Invalid data_bits {} (use 5 - 8)",
                self.data_bits
            )));
        }

        if !(1..=2).contains(&self.stop_bits) {
            return Err(ConfigError::Validation(format!(
                "Invalid stop_bits {} (use 1 or 2)",
                self.stop_bits
            )));
        }

        Ok(())
    }
}

impl TimingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        // (name, value, upper bound)
        let fields = [
            ("step_delay_ms", self.step_delay_ms, MAX_STEP_DELAY_MS),
            ("device_budget_secs", self.device_budget_secs, MAX_DEVICE_BUDGET_SECS),
            ("idle_backoff_secs", self.idle_backoff_secs, MAX_IDLE_BACKOFF_SECS),
            ("freshness_secs", self.freshness_secs, MAX_FRESHNESS_SECS),
            ("read_timeout_ms", self.read_timeout_ms, MAX_READ_TIMEOUT_MS),
        ];
        for (name, value, max) in fields {
            if value == 0 {
                return Err(ConfigError::Validation(format!(
                    "timing.{} must be non-zero",
                    name
                )));
            }
            if value > max {
                return Err(ConfigError::Validation(format!(
                    "timing.{} ({}) exceeds the maximum of {}",
                    name, value, max
                )));
            }
        }

        let worst_case = self.worst_case_sequence();
        if self.device_budget() <= worst_case {
            return Err(ConfigError::Validation(format!(
                "timing.device_budget_secs ({}s) must exceed the longest possible sequence ({:?})",
                self.device_budget_secs, worst_case
            )));
        }

        Ok(())
    }
}
