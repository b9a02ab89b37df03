//! Bridge status reporting.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use zenoh::Session;

/// Bridge identifier carried in every status message.
pub const BRIDGE_NAME: &str = "airq";

/// Lifecycle state of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeState {
    Running,
    Offline,
    Error,
}

/// Bridge status information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeStatus {
    pub bridge: String,
    pub version: String,
    pub status: BridgeState,
    /// Additional metadata (serial port, devices, ...).
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl BridgeStatus {
    fn new(status: BridgeState) -> Self {
        Self {
            bridge: BRIDGE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            status,
            metadata: Map::new(),
        }
    }

    pub fn running() -> Self {
        Self::new(BridgeState::Running)
    }

    pub fn offline() -> Self {
        Self::new(BridgeState::Offline)
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::new(BridgeState::Error).with("error", error.into())
    }

    /// Status published when the serial line cannot be opened.
    pub fn serial_failure(port: &str, error: impl std::fmt::Display) -> Self {
        Self::error(error.to_string()).with("serial_port", port)
    }

    /// Attach one metadata field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Publish this status as JSON on `key`.
    pub async fn publish(&self, session: &Session, key: &str) -> airq_common::Result<()> {
        let payload = serde_json::to_string(self)?;
        session.put(key, payload).await?;
        Ok(())
    }
}
