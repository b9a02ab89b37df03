//! Consumer-facing access to registration and cached readings.

use std::time::Duration;

use airq_common::{AddressError, DeviceAddress, MetricKind};
use tokio::time::Instant;
use tracing::warn;

use crate::cache::{DEFAULT_FRESHNESS_WINDOW, Reading, SensorCache, SharedCache};
use crate::registry::{DeviceRegistry, SharedRegistry};

/// Shared handle over the device registry and the sensor cache.
///
/// Cheap to clone; every clone sees the same registry and cache.
#[derive(Debug, Clone)]
pub struct SensorHub {
    cache: SharedCache,
    registry: SharedRegistry,
    freshness_window: Duration,
}

impl SensorHub {
    pub fn new(freshness_window: Duration) -> Self {
        Self {
            cache: SensorCache::shared(),
            registry: DeviceRegistry::shared(),
            freshness_window,
        }
    }

    /// Validate a raw device id and register it.
    ///
    /// Invalid input is logged and rejected without touching the registry.
    pub fn add_device(&self, raw: &str) -> Result<DeviceAddress, AddressError> {
        match raw.parse::<DeviceAddress>() {
            Ok(address) => {
                self.add_address(address);
                Ok(address)
            }
            Err(e) => {
                warn!(
                    input = raw,
                    error = %e,
                    "Device ID should be {} ~ {} because it is for RS485 slave ID",
                    DeviceAddress::MIN,
                    DeviceAddress::MAX
                );
                Err(e)
            }
        }
    }

    /// Register an already validated address. Returns `false` if it was known.
    pub fn add_address(&self, address: DeviceAddress) -> bool {
        self.registry.write().add(address)
    }

    /// Latest reading for `metric` on `address`, if still fresh.
    pub fn get_sensor_value(&self, address: DeviceAddress, metric: MetricKind) -> Option<Reading> {
        self.get_sensor_value_at(address, metric, Instant::now())
    }

    pub fn get_sensor_value_at(
        &self,
        address: DeviceAddress,
        metric: MetricKind,
        now: Instant,
    ) -> Option<Reading> {
        self.cache
            .read()
            .fetch(metric, address, now, self.freshness_window)
    }

    pub fn devices(&self) -> Vec<DeviceAddress> {
        self.registry.read().all()
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn freshness_window(&self) -> Duration {
        self.freshness_window
    }
}

impl Default for SensorHub {
    fn default() -> Self {
        Self::new(DEFAULT_FRESHNESS_WINDOW)
    }
}
