//! Time-stamped cache of the latest reading per metric and device.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use airq_common::{DeviceAddress, MetricKind, SensorValue};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::time::Instant;

/// How long a reading stays valid after it was acquired.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(120);

/// Cache shared between the scheduler (writer) and consumers (readers).
pub type SharedCache = Arc<RwLock<SensorCache>>;

/// One raw register value and when it was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    /// Raw holding register value.
    pub value: u16,
    /// Monotonic acquisition instant, used for freshness checks.
    pub acquired_at: Instant,
    /// Wall-clock time the reading was stored, reported to consumers.
    ///
    /// Taken from the system clock at insertion, independently of
    /// `acquired_at`; it plays no part in freshness checks.
    pub read_at: DateTime<Utc>,
}

impl Reading {
    /// Stamp `value` with `acquired_at` and the current wall-clock time.
    pub fn new(value: u16, acquired_at: Instant) -> Self {
        Self {
            value,
            acquired_at,
            read_at: Utc::now(),
        }
    }

    /// Age of the reading relative to `now` (zero if `now` is earlier).
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.acquired_at)
    }

    /// Convert into the payload answered to consumers.
    pub fn to_sensor_value(&self, address: DeviceAddress, metric: MetricKind) -> SensorValue {
        SensorValue::new(address, metric, self.value, self.read_at.timestamp_millis())
    }
}

/// Latest reading per (metric, device).
///
/// A missing entry means the pair was never read successfully. A present
/// entry may still be stale; freshness is decided at [`fetch`](Self::fetch)
/// time.
#[derive(Debug, Default)]
pub struct SensorCache {
    readings: HashMap<MetricKind, HashMap<DeviceAddress, Reading>>,
}

impl SensorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache ready to be shared across tasks.
    pub fn shared() -> SharedCache {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Store a reading, replacing whatever was recorded before.
    ///
    /// `now` drives freshness; the reported wall-clock time is the time of
    /// this call.
    pub fn record(
        &mut self,
        metric: MetricKind,
        device: DeviceAddress,
        value: u16,
        now: Instant,
    ) -> Reading {
        let reading = Reading::new(value, now);
        self.readings
            .entry(metric)
            .or_default()
            .insert(device, reading);
        reading
    }

    /// Return the reading if it is at most `freshness_window` old at `now`.
    pub fn fetch(
        &self,
        metric: MetricKind,
        device: DeviceAddress,
        now: Instant,
        freshness_window: Duration,
    ) -> Option<Reading> {
        self.readings
            .get(&metric)?
            .get(&device)
            .filter(|reading| reading.age(now) <= freshness_window)
            .copied()
    }

    /// The stored reading regardless of its age.
    pub fn latest(&self, metric: MetricKind, device: DeviceAddress) -> Option<Reading> {
        self.readings.get(&metric)?.get(&device).copied()
    }

    /// Devices that have at least one stored reading for `metric`.
    pub fn devices(&self, metric: MetricKind) -> Vec<DeviceAddress> {
        let mut devices: Vec<_> = self
            .readings
            .get(&metric)
            .map(|by_device| by_device.keys().copied().collect())
            .unwrap_or_default();
        devices.sort();
        devices
    }

    /// Total number of stored readings.
    pub fn len(&self) -> usize {
        self.readings.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(id: u8) -> DeviceAddress {
        DeviceAddress::new(id).unwrap()
    }

    #[test]
    fn test_fetch_within_window() {
        let mut cache = SensorCache::new();
        let t = Instant::now();
        cache.record(MetricKind::Co2, address(1), 812, t);

        let reading = cache
            .fetch(
                MetricKind::Co2,
                address(1),
                t + Duration::from_secs(1),
                DEFAULT_FRESHNESS_WINDOW,
            )
            .unwrap();
        assert_eq!(reading.value, 812);

        // Exactly at the window edge is still fresh
        let edge = t + DEFAULT_FRESHNESS_WINDOW;
        assert!(
            cache
                .fetch(MetricKind::Co2, address(1), edge, DEFAULT_FRESHNESS_WINDOW)
                .is_some()
        );
    }

    #[test]
    fn test_fetch_stale_is_absent_but_kept() {
        let mut cache = SensorCache::new();
        let t = Instant::now();
        cache.record(MetricKind::Co2, address(1), 812, t);

        assert!(
            cache
                .fetch(
                    MetricKind::Co2,
                    address(1),
                    t + Duration::from_secs(121),
                    DEFAULT_FRESHNESS_WINDOW,
                )
                .is_none()
        );
        assert_eq!(cache.latest(MetricKind::Co2, address(1)).unwrap().value, 812);
    }

    #[test]
    fn test_fetch_never_read() {
        let mut cache = SensorCache::new();
        let t = Instant::now();
        let window = DEFAULT_FRESHNESS_WINDOW;
        assert!(cache.fetch(MetricKind::Humidity, address(9), t, window).is_none());

        // Other metrics and devices do not leak into the lookup
        cache.record(MetricKind::Co2, address(9), 400, t);
        cache.record(MetricKind::Humidity, address(8), 400, t);
        assert!(cache.fetch(MetricKind::Humidity, address(9), t, window).is_none());
    }

    #[test]
    fn test_record_overwrites() {
        let mut cache = SensorCache::new();
        let t = Instant::now();
        cache.record(MetricKind::Temperature, address(2), 200, t);
        cache.record(
            MetricKind::Temperature,
            address(2),
            215,
            t + Duration::from_secs(30),
        );

        let reading = cache.latest(MetricKind::Temperature, address(2)).unwrap();
        assert_eq!(reading.value, 215);
        assert_eq!(reading.acquired_at, t + Duration::from_secs(30));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_configurable_window() {
        let mut cache = SensorCache::new();
        let t = Instant::now();
        cache.record(MetricKind::Co2, address(1), 700, t);

        let window = Duration::from_secs(10);
        let at = |secs| t + Duration::from_secs(secs);
        assert!(cache.fetch(MetricKind::Co2, address(1), at(10), window).is_some());
        assert!(cache.fetch(MetricKind::Co2, address(1), at(11), window).is_none());
    }

    #[test]
    fn test_wall_clock_stamped_at_insertion() {
        let mut cache = SensorCache::new();
        // A synthetic instant far in the future does not shift the wall clock
        let synthetic = Instant::now() + Duration::from_secs(3600);

        let before = Utc::now();
        let reading = cache.record(MetricKind::Co2, address(1), 640, synthetic);
        let after = Utc::now();

        assert_eq!(reading.acquired_at, synthetic);
        assert!(before <= reading.read_at && reading.read_at <= after);
    }

    #[test]
    fn test_devices_and_payload() {
        let mut cache = SensorCache::new();
        let t = Instant::now();
        cache.record(MetricKind::Co2, address(3), 1, t);
        let reading = cache.record(MetricKind::Co2, address(1), 2, t);

        assert_eq!(cache.devices(MetricKind::Co2), vec![address(1), address(3)]);
        assert!(cache.devices(MetricKind::Humidity).is_empty());

        let value = reading.to_sensor_value(address(1), MetricKind::Co2);
        assert_eq!(value.raw, 2);
        assert_eq!(value.timestamp, reading.read_at.timestamp_millis());
    }
}
