//! Sensor metrics exposed by an AirQ node.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Holding register carrying the CO2 concentration (ppm).
pub const CO2_REGISTER: u16 = 0x65;

/// Holding register carrying the temperature (tenths of °C).
pub const TEMPERATURE_REGISTER: u16 = 0x66;

/// Holding register carrying the relative humidity (tenths of %).
pub const HUMIDITY_REGISTER: u16 = 0x67;

/// A metric read from an AirQ node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Co2,
    Temperature,
    Humidity,
}

impl MetricKind {
    /// Order in which a node is read during one sequence.
    pub const SEQUENCE: [MetricKind; 3] =
        [MetricKind::Co2, MetricKind::Temperature, MetricKind::Humidity];

    /// Name used in key expressions and log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Co2 => "co2",
            MetricKind::Temperature => "temperature",
            MetricKind::Humidity => "humidity",
        }
    }

    /// Sensor model name used by the host device framework.
    pub fn model_name(&self) -> &'static str {
        match self {
            MetricKind::Co2 => "airqCo2",
            MetricKind::Temperature => "airqTemp",
            MetricKind::Humidity => "airqHumi",
        }
    }

    /// Default holding register for this metric.
    pub fn default_register(&self) -> u16 {
        match self {
            MetricKind::Co2 => CO2_REGISTER,
            MetricKind::Temperature => TEMPERATURE_REGISTER,
            MetricKind::Humidity => HUMIDITY_REGISTER,
        }
    }

    /// Divisor a consumer applies to the raw register value to get physical units.
    pub fn scale_divisor(&self) -> f64 {
        match self {
            MetricKind::Co2 => 1.0,
            MetricKind::Temperature | MetricKind::Humidity => 10.0,
        }
    }

    /// Physical unit after scaling.
    pub fn unit(&self) -> &'static str {
        match self {
            MetricKind::Co2 => "ppm",
            MetricKind::Temperature => "°C",
            MetricKind::Humidity => "%",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    /// Accepts either the key expression name or the host model name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKind::SEQUENCE
            .into_iter()
            .find(|metric| metric.as_str() == s || metric.model_name() == s)
            .ok_or_else(|| format!("unknown metric '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_order() {
        assert_eq!(
            MetricKind::SEQUENCE,
            [MetricKind::Co2, MetricKind::Temperature, MetricKind::Humidity]
        );
    }

    #[test]
    fn test_default_registers() {
        assert_eq!(MetricKind::Co2.default_register(), 0x65);
        assert_eq!(MetricKind::Temperature.default_register(), 0x66);
        assert_eq!(MetricKind::Humidity.default_register(), 0x67);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("co2".parse::<MetricKind>().unwrap(), MetricKind::Co2);
        assert_eq!(
            "airqTemp".parse::<MetricKind>().unwrap(),
            MetricKind::Temperature
        );
        assert_eq!(
            "humidity".parse::<MetricKind>().unwrap(),
            MetricKind::Humidity
        );
        assert!("number".parse::<MetricKind>().is_err());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&MetricKind::Temperature).unwrap(),
            "\"temperature\""
        );
    }
}
