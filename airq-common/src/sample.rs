use serde::{Deserialize, Serialize};

use crate::device::DeviceAddress;
use crate::metric::MetricKind;

/// The latest reading of one metric on one device, as answered to consumers.
///
/// `raw` is the untouched register value; converting to physical units is
/// left to the consumer through [`SensorValue::scaled`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorValue {
    /// Device the value was read from.
    pub address: DeviceAddress,

    /// Which metric this is.
    pub metric: MetricKind,

    /// Raw holding register value.
    pub raw: u16,

    /// Unix epoch milliseconds when the register was read.
    pub timestamp: i64,
}

impl SensorValue {
    pub fn new(address: DeviceAddress, metric: MetricKind, raw: u16, timestamp: i64) -> Self {
        Self {
            address,
            metric,
            raw,
            timestamp,
        }
    }

    /// The value in physical units (ppm, °C or %).
    pub fn scaled(&self) -> f64 {
        f64::from(self.raw) / self.metric.scale_divisor()
    }

    /// Sensor identifier in the host framework's `{model}-{address}` form.
    pub fn sensor_id(&self) -> String {
        format!("{}-{}", self.metric.model_name(), self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(id: u8) -> DeviceAddress {
        DeviceAddress::new(id).unwrap()
    }

    #[test]
    fn test_scaled_values() {
        let co2 = SensorValue::new(address(1), MetricKind::Co2, 812, 0);
        assert_eq!(co2.scaled(), 812.0);

        let temperature = SensorValue::new(address(1), MetricKind::Temperature, 231, 0);
        assert_eq!(temperature.scaled(), 23.1);

        let humidity = SensorValue::new(address(1), MetricKind::Humidity, 455, 0);
        assert_eq!(humidity.scaled(), 45.5);
    }

    #[test]
    fn test_sensor_id() {
        let value = SensorValue::new(address(3), MetricKind::Humidity, 0, 0);
        assert_eq!(value.sensor_id(), "airqHumi-3");
    }
}
