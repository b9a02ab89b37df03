//! Known device addresses.

use std::sync::Arc;

use airq_common::DeviceAddress;
use parking_lot::RwLock;
use tracing::info;

/// Registry shared between the scheduler and the registration paths.
pub type SharedRegistry = Arc<RwLock<DeviceRegistry>>;

/// Insertion-ordered, deduplicated set of device addresses.
///
/// Devices are never removed for the lifetime of the process.
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    devices: Vec<DeviceAddress>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry ready to be shared across tasks.
    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Register an address. Returns `false` if it was already known.
    pub fn add(&mut self, address: DeviceAddress) -> bool {
        if self.devices.contains(&address) {
            return false;
        }

        info!(device = %address, "Device is added");
        self.devices.push(address);
        true
    }

    /// Snapshot of the registered addresses in registration order.
    ///
    /// The registry may grow between two calls.
    pub fn all(&self) -> Vec<DeviceAddress> {
        self.devices.clone()
    }

    pub fn contains(&self, address: DeviceAddress) -> bool {
        self.devices.contains(&address)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl Extend<DeviceAddress> for DeviceRegistry {
    fn extend<I: IntoIterator<Item = DeviceAddress>>(&mut self, iter: I) {
        for address in iter {
            self.add(address);
        }
    }
}
