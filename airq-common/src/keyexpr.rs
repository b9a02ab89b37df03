use crate::device::DeviceAddress;
use crate::error::{Error, Result};
use crate::metric::MetricKind;

/// Default key expression prefix for AirQ sensor values.
pub const KEY_PREFIX: &str = "airq";

/// Builder for AirQ key expressions.
///
/// Sensor keys follow the pattern `<prefix>/<address>/<metric>`; bridge
/// administration keys live under `<prefix>/@/`.
#[derive(Debug, Clone)]
pub struct SensorKeyBuilder {
    prefix: String,
}

impl SensorKeyBuilder {
    /// Create a builder with the default prefix.
    pub fn new() -> Self {
        Self::with_prefix(KEY_PREFIX)
    }

    /// Create a builder with a custom prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build the key for one metric on one device.
    ///
    /// # Example
    /// ```
    /// use airq_common::{DeviceAddress, MetricKind, SensorKeyBuilder};
    ///
    /// let address = DeviceAddress::new(1).unwrap();
    /// let key = SensorKeyBuilder::new().build(address, MetricKind::Co2);
    /// assert_eq!(key, "airq/1/co2");
    /// ```
    pub fn build(&self, address: DeviceAddress, metric: MetricKind) -> String {
        format!("{}/{}/{}", self.prefix, address, metric.as_str())
    }

    /// Wildcard matching every metric of one device.
    pub fn device_wildcard(&self, address: DeviceAddress) -> String {
        format!("{}/{}/*", self.prefix, address)
    }

    /// Wildcard matching every sensor key (but not the `@` admin space).
    ///
    /// # Example
    /// ```
    /// use airq_common::SensorKeyBuilder;
    ///
    /// assert_eq!(SensorKeyBuilder::new().sensors_wildcard(), "airq/*/*");
    /// ```
    pub fn sensors_wildcard(&self) -> String {
        format!("{}/*/*", self.prefix)
    }

    /// Key the bridge publishes its status on.
    pub fn status_key(&self) -> String {
        format!("{}/@/status", self.prefix)
    }

    /// Key on which "device seen" announcements are received.
    pub fn register_key(&self) -> String {
        format!("{}/@/register", self.prefix)
    }
}

impl Default for SensorKeyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parsed components of an AirQ sensor key expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedSensorKey {
    pub address: DeviceAddress,
    pub metric: MetricKind,
}

/// Parse `<prefix>/<address>/<metric>`.
///
/// The address is validated as an RS-485 slave id and the metric may be given
/// by key name or host model name.
pub fn parse_sensor_key(prefix: &str, key: &str) -> Result<ParsedSensorKey> {
    let rest = key
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or_else(|| Error::KeyExpr(format!("'{}' is not under '{}'", key, prefix)))?;

    let parts: Vec<&str> = rest.split('/').collect();
    let [address, metric] = parts.as_slice() else {
        return Err(Error::KeyExpr(format!(
            "'{}' does not match <prefix>/<address>/<metric>",
            key
        )));
    };

    let address: DeviceAddress = address.parse()?;
    let metric: MetricKind = metric.parse().map_err(Error::KeyExpr)?;

    Ok(ParsedSensorKey { address, metric })
}
