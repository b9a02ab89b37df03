//! One ordered CO2 → temperature → humidity read of a single device.

use std::time::Duration;

use airq_common::{DeviceAddress, MetricKind};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{Reading, SharedCache};
use crate::transport::{RegisterMap, RegisterTransport, TransportError};

/// Pause between two register reads of the same sequence.
pub const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(2000);

/// Where a sequence currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SequenceState {
    SelectDevice,
    /// Read the metric at this index of [`MetricKind::SEQUENCE`].
    Read(usize),
    /// Wait before reading the metric at this index.
    Settle(usize),
    Done,
}

/// Outcome of one sequence.
#[derive(Debug)]
pub struct SequenceReport {
    pub address: DeviceAddress,
    /// Successful reads, in execution order.
    pub readings: Vec<(MetricKind, Reading)>,
    /// The step that ended the sequence early, if any.
    pub failure: Option<(MetricKind, TransportError)>,
}

impl SequenceReport {
    fn new(address: DeviceAddress) -> Self {
        Self {
            address,
            readings: Vec::new(),
            failure: None,
        }
    }

    /// True when every metric was read.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && self.readings.len() == MetricKind::SEQUENCE.len()
    }

    /// `metric:value(timestamp)` pairs joined by `", "`.
    pub fn summary(&self) -> String {
        self.readings
            .iter()
            .map(|(metric, reading)| {
                format!(
                    "{}:{}({})",
                    metric,
                    reading.value,
                    reading.read_at.timestamp_millis()
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Reads CO2, temperature and humidity from one device, storing each
/// successful value in the cache.
///
/// The sequencer keeps no state between runs. It assumes exclusive use of the
/// transport for the duration of [`run`](Self::run).
#[derive(Debug, Clone)]
pub struct ReadSequencer {
    cache: SharedCache,
    registers: RegisterMap,
    step_delay: Duration,
}

impl ReadSequencer {
    pub fn new(cache: SharedCache, registers: RegisterMap, step_delay: Duration) -> Self {
        Self {
            cache,
            registers,
            step_delay,
        }
    }

    pub fn step_delay(&self) -> Duration {
        self.step_delay
    }

    /// Run one full sequence against `address`.
    ///
    /// A failed read ends the sequence; values read before the failure stay
    /// in the cache.
    pub async fn run<T: RegisterTransport>(
        &self,
        transport: &mut T,
        address: DeviceAddress,
    ) -> SequenceReport {
        let mut report = SequenceReport::new(address);
        let mut state = SequenceState::SelectDevice;

        loop {
            state = match state {
                SequenceState::SelectDevice => {
                    debug!(device = %address, "Start to read sensor values");
                    transport.select_device(address);
                    SequenceState::Read(0)
                }
                SequenceState::Read(step) => {
                    let metric = MetricKind::SEQUENCE[step];
                    match self.read_metric(transport, address, metric).await {
                        Ok(reading) => {
                            report.readings.push((metric, reading));
                            if step + 1 < MetricKind::SEQUENCE.len() {
                                SequenceState::Settle(step + 1)
                            } else {
                                SequenceState::Done
                            }
                        }
                        Err(e) => {
                            warn!(
                                device = %address,
                                step = %metric,
                                error = %e,
                                "Sensor read failed, skipping remaining steps"
                            );
                            report.failure = Some((metric, e));
                            SequenceState::Done
                        }
                    }
                }
                SequenceState::Settle(next) => {
                    tokio::time::sleep(self.step_delay).await;
                    SequenceState::Read(next)
                }
                SequenceState::Done => break,
            };
        }

        if !report.readings.is_empty() {
            info!(device = %address, "{}", report.summary());
        }
        report
    }

    async fn read_metric<T: RegisterTransport>(
        &self,
        transport: &mut T,
        address: DeviceAddress,
        metric: MetricKind,
    ) -> Result<Reading, TransportError> {
        let register = self.registers.register_for(metric);
        debug!(device = %address, step = %metric, register, "Register read");

        let values = transport.read_register(register, 1).await?;
        let value = values
            .first()
            .copied()
            .ok_or(TransportError::EmptyResponse)?;

        let reading = self
            .cache
            .write()
            .record(metric, address, value, Instant::now());
        debug!(device = %address, step = %metric, value, "Register read done");

        Ok(reading)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::{DEFAULT_FRESHNESS_WINDOW, SensorCache};
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};
    use std::io;
    use std::sync::Arc;
    use tracing::Level;
    use tracing::subscriber::DefaultGuard;

    /// A transport call observed by [`MockTransport`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Call {
        Select(DeviceAddress),
        Read { device: DeviceAddress, register: u16 },
    }

    /// Records every call with the (paused) time it happened at.
    #[derive(Debug, Default)]
    pub struct MockTransport {
        selected: Option<DeviceAddress>,
        pub calls: Vec<(Instant, Call)>,
        /// Scripted results per (device, register); reads default to `register + device`.
        pub scripted: HashMap<(DeviceAddress, u16), VecDeque<Result<u16, ()>>>,
        /// Simulated I/O time per read.
        pub io_time: Duration,
    }

    impl MockTransport {
        pub fn with_io_time(io_time: Duration) -> Self {
            Self {
                io_time,
                ..Self::default()
            }
        }

        pub fn fail(&mut self, device: DeviceAddress, register: u16) {
            self.scripted
                .entry((device, register))
                .or_default()
                .push_back(Err(()));
        }

        pub fn reads(&self) -> Vec<(Instant, DeviceAddress, u16)> {
            self.calls
                .iter()
                .filter_map(|(at, call)| match call {
                    Call::Read { device, register } => Some((*at, *device, *register)),
                    Call::Select(_) => None,
                })
                .collect()
        }

        pub fn selects(&self) -> Vec<(Instant, DeviceAddress)> {
            self.calls
                .iter()
                .filter_map(|(at, call)| match call {
                    Call::Select(device) => Some((*at, *device)),
                    Call::Read { .. } => None,
                })
                .collect()
        }
    }

    impl RegisterTransport for MockTransport {
        fn select_device(&mut self, address: DeviceAddress) {
            self.selected = Some(address);
            self.calls.push((Instant::now(), Call::Select(address)));
        }

        async fn read_register(
            &mut self,
            register: u16,
            count: u16,
        ) -> Result<Vec<u16>, TransportError> {
            assert_eq!(count, 1);
            let device = self.selected.expect("read before select");
            self.calls
                .push((Instant::now(), Call::Read { device, register }));

            if !self.io_time.is_zero() {
                tokio::time::sleep(self.io_time).await;
            }

            let scripted = self
                .scripted
                .get_mut(&(device, register))
                .and_then(VecDeque::pop_front);
            match scripted {
                Some(Ok(value)) => Ok(vec![value]),
                Some(Err(())) => Err(TransportError::Timeout(Duration::from_secs(1))),
                None => Ok(vec![register + u16::from(device.get())]),
            }
        }
    }

    pub fn address(id: u8) -> DeviceAddress {
        DeviceAddress::new(id).unwrap()
    }

    /// In-memory sink for formatted log output.
    #[derive(Debug, Clone, Default)]
    pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Route this thread's tracing events into a buffer until the guard drops.
    pub fn capture_logs() -> (LogBuffer, DefaultGuard) {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(Level::DEBUG)
            .with_ansi(false)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (logs, guard)
    }

    fn sequencer(cache: &SharedCache) -> ReadSequencer {
        ReadSequencer::new(cache.clone(), RegisterMap::default(), DEFAULT_STEP_DELAY)
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_sequence_order_and_delays() {
        let cache = SensorCache::shared();
        let mut transport = MockTransport::default();
        let start = Instant::now();

        let report = sequencer(&cache).run(&mut transport, address(1)).await;

        assert!(report.is_complete());
        assert_eq!(transport.selects(), vec![(start, address(1))]);
        assert_eq!(
            transport.reads(),
            vec![
                (start, address(1), 0x65),
                (start + Duration::from_secs(2), address(1), 0x66),
                (start + Duration::from_secs(4), address(1), 0x67),
            ]
        );

        // No trailing delay after the last step
        assert_eq!(Instant::now(), start + Duration::from_secs(4));

        let cache = cache.read();
        let now = Instant::now();
        for metric in MetricKind::SEQUENCE {
            let reading = cache
                .fetch(metric, address(1), now, DEFAULT_FRESHNESS_WINDOW)
                .unwrap();
            assert_eq!(reading.value, metric.default_register() + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timestamps_are_ordered() {
        let cache = SensorCache::shared();
        let mut transport = MockTransport::with_io_time(Duration::from_millis(150));

        let report = sequencer(&cache).run(&mut transport, address(3)).await;

        let instants: Vec<_> = report.readings.iter().map(|(_, r)| r.acquired_at).collect();
        assert_eq!(instants.len(), 3);
        assert!(instants.windows(2).all(|w| w[0] <= w[1]));
        let metrics: Vec<_> = report.readings.iter().map(|(m, _)| *m).collect();
        assert_eq!(metrics, MetricKind::SEQUENCE.to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_aborts_remaining_steps() {
        let cache = SensorCache::shared();
        let mut transport = MockTransport::default();
        transport.fail(address(2), 0x66);

        let report = sequencer(&cache).run(&mut transport, address(2)).await;

        assert!(!report.is_complete());
        assert!(matches!(
            report.failure,
            Some((MetricKind::Temperature, TransportError::Timeout(_)))
        ));

        // Humidity is never attempted
        let registers: Vec<_> = transport.reads().iter().map(|(_, _, r)| *r).collect();
        assert_eq!(registers, vec![0x65, 0x66]);

        let cache = cache.read();
        let now = Instant::now();
        let window = DEFAULT_FRESHNESS_WINDOW;
        assert!(cache.fetch(MetricKind::Co2, address(2), now, window).is_some());
        assert!(cache.fetch(MetricKind::Temperature, address(2), now, window).is_none());
        assert!(cache.fetch(MetricKind::Humidity, address(2), now, window).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_previous_values() {
        let cache = SensorCache::shared();
        let mut transport = MockTransport::default();
        let sequencer = sequencer(&cache);

        sequencer.run(&mut transport, address(4)).await;
        transport.fail(address(4), 0x65);
        let report = sequencer.run(&mut transport, address(4)).await;

        assert!(report.readings.is_empty());
        assert_eq!(report.summary(), "");

        // Earlier readings are neither removed nor refreshed
        let cache = cache.read();
        assert_eq!(cache.len(), 3);
        assert_eq!(
            cache.latest(MetricKind::Humidity, address(4)).unwrap().value,
            0x67 + 4
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_response_is_a_failure() {
        struct Silent;

        impl RegisterTransport for Silent {
            fn select_device(&mut self, _address: DeviceAddress) {}

            async fn read_register(
                &mut self,
                _register: u16,
                _count: u16,
            ) -> Result<Vec<u16>, TransportError> {
                Ok(Vec::new())
            }
        }

        let cache = SensorCache::shared();
        let report = sequencer(&cache).run(&mut Silent, address(1)).await;

        assert!(matches!(
            report.failure,
            Some((MetricKind::Co2, TransportError::EmptyResponse))
        ));
        assert!(cache.read().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_logged_once_per_sequence() {
        let (logs, _guard) = capture_logs();
        let cache = SensorCache::shared();
        let mut transport = MockTransport::default();

        sequencer(&cache).run(&mut transport, address(1)).await;

        let output = logs.contents();
        let summaries: Vec<_> = output
            .lines()
            .filter(|line| line.contains(" INFO ") && line.contains("co2:102("))
            .collect();
        assert_eq!(summaries.len(), 1, "{output}");
        assert!(summaries[0].contains("humidity:104("), "{output}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_summary_when_first_read_fails() {
        let (logs, _guard) = capture_logs();
        let cache = SensorCache::shared();
        let mut transport = MockTransport::default();
        transport.fail(address(1), 0x65);

        let report = sequencer(&cache).run(&mut transport, address(1)).await;

        assert!(report.readings.is_empty());
        let output = logs.contents();
        assert!(output.contains(" WARN "), "{output}");
        assert!(!output.contains(" INFO "), "{output}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_format() {
        let cache = SensorCache::shared();
        let mut transport = MockTransport::default();
        transport.fail(address(1), 0x67);

        let report = sequencer(&cache).run(&mut transport, address(1)).await;
        let summary = report.summary();

        assert!(summary.starts_with("co2:102("), "{summary}");
        assert!(summary.contains(", temperature:103("), "{summary}");
        assert!(!summary.contains("humidity"), "{summary}");
    }
}
