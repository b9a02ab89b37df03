//! Configuration sections shared by AirQ processes, and JSON5 loading.
//!
//! Each process defines its own top-level struct and embeds [`ZenohConfig`]
//! and [`LoggingConfig`] as its `zenoh` and `logging` sections.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Zenoh session settings.
///
/// `mode` is checked when the session is built, see
/// [`build_zenoh_config`](crate::session::build_zenoh_config).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZenohConfig {
    /// "client", "peer" or "router" (default: "peer")
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Endpoints to connect to, e.g. `tcp/10.0.0.1:7447`
    #[serde(default)]
    pub connect: Vec<String>,

    /// Endpoints to listen on
    #[serde(default)]
    pub listen: Vec<String>,
}

fn default_mode() -> String {
    "peer".to_string()
}

impl Default for ZenohConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            connect: Vec::new(),
            listen: Vec::new(),
        }
    }
}

/// Formatter used by [`init_tracing`](crate::init_tracing).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Logging section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. "info" or "zenoh_bridge_airq=debug"
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Replace the level when a command-line override is given.
    pub fn with_level_override(mut self, level: Option<&str>) -> Self {
        if let Some(level) = level {
            self.level = level.to_string();
        }
        self
    }
}

/// Deserialize a JSON5 document.
pub fn parse_config<T: DeserializeOwned>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Invalid JSON5: {}", e)))
}

/// Read and deserialize a JSON5 file.
///
/// Errors name the offending path.
pub fn load_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Cannot read '{}': {}", path.display(), e)))?;

    parse_config(&content).map_err(|e| match e {
        Error::Config(reason) => Error::Config(format!("{}: {}", path.display(), reason)),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct ProcessConfig {
        #[serde(default)]
        zenoh: ZenohConfig,
        #[serde(default)]
        logging: LoggingConfig,
        #[serde(default)]
        devices: Vec<u8>,
    }

    #[test]
    fn test_sections_embed_in_process_config() {
        let config: ProcessConfig = parse_config(
            r#"{
                zenoh: { mode: "client", connect: ["tcp/10.0.0.1:7447"] },
                logging: { level: "zenoh_bridge_airq=debug", format: "json" },
                devices: [1, 2], // trailing comma and comments are JSON5
            }"#,
        )
        .unwrap();

        assert_eq!(config.zenoh.mode, "client");
        assert_eq!(config.zenoh.connect, vec!["tcp/10.0.0.1:7447"]);
        assert!(config.zenoh.listen.is_empty());
        assert_eq!(config.logging.level, "zenoh_bridge_airq=debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.devices, vec![1, 2]);
    }

    #[test]
    fn test_missing_sections_default() {
        let config: ProcessConfig = parse_config("{}").unwrap();

        assert_eq!(config.zenoh, ZenohConfig::default());
        assert_eq!(config.zenoh.mode, "peer");
        assert_eq!(config.logging, LoggingConfig::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_level_override() {
        let logging = LoggingConfig::default();

        assert_eq!(logging.clone().with_level_override(None).level, "info");
        assert_eq!(logging.with_level_override(Some("trace")).level, "trace");
    }

    #[test]
    fn test_parse_error() {
        let result: Result<ProcessConfig> = parse_config("{ devices: [1, 2 }");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let result: Result<ProcessConfig> = load_config("/nonexistent/airq.json5");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/airq.json5"), "{err}");
    }
}
