//! Round-robin scheduling of read sequences across registered devices.
//!
//! Every cycle gives each registered device one slot of `device_budget`, in
//! registration order, and starts the next cycle `N * device_budget` after the
//! current one began. All sequences run on the scheduler's own task, so the
//! shared transport session is never used by two sequences at once. The
//! budget is a soft bound: a sequence that overruns its slot delays the
//! following ones rather than being cut short.

use std::time::Duration;

use airq_common::DeviceAddress;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::registry::SharedRegistry;
use crate::sequencer::ReadSequencer;
use crate::transport::RegisterTransport;

/// Time reserved for one device within a cycle.
pub const DEFAULT_DEVICE_BUDGET: Duration = Duration::from_secs(15);

/// How long to wait before checking an empty registry again.
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_secs(10);

/// Scheduler timing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerTiming {
    /// Slot length per device. Must exceed one sequence's worst case.
    pub device_budget: Duration,
    /// Re-check interval while no device is registered.
    pub idle_backoff: Duration,
}

impl Default for SchedulerTiming {
    fn default() -> Self {
        Self {
            device_budget: DEFAULT_DEVICE_BUDGET,
            idle_backoff: DEFAULT_IDLE_BACKOFF,
        }
    }
}

/// One device's turn within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Offset from the cycle start.
    pub offset: Duration,
    pub address: DeviceAddress,
}

/// What the scheduler does in one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CyclePlan {
    /// Nothing registered; look again later.
    Idle { recheck_after: Duration },
    /// Poll every device once, then start over.
    Cycle {
        slots: Vec<Slot>,
        next_cycle_after: Duration,
    },
}

impl CyclePlan {
    /// Plan a cycle over `devices`, in the given order.
    pub fn build(devices: &[DeviceAddress], timing: &SchedulerTiming) -> Self {
        if devices.is_empty() {
            return CyclePlan::Idle {
                recheck_after: timing.idle_backoff,
            };
        }

        let slots = (0u32..)
            .zip(devices)
            .map(|(index, &address)| Slot {
                offset: timing.device_budget.saturating_mul(index),
                address,
            })
            .collect::<Vec<_>>();
        let count = u32::try_from(slots.len()).unwrap_or(u32::MAX);
        let next_cycle_after = timing.device_budget.saturating_mul(count);

        CyclePlan::Cycle {
            slots,
            next_cycle_after,
        }
    }

    pub fn slots(&self) -> &[Slot] {
        match self {
            CyclePlan::Idle { .. } => &[],
            CyclePlan::Cycle { slots, .. } => slots,
        }
    }

    /// Delay from this cycle's start to the next one.
    pub fn next_cycle_after(&self) -> Duration {
        match self {
            CyclePlan::Idle { recheck_after } => *recheck_after,
            CyclePlan::Cycle {
                next_cycle_after, ..
            } => *next_cycle_after,
        }
    }
}

/// Drives [`ReadSequencer`] over every registered device, forever.
pub struct DeviceScheduler<T> {
    registry: SharedRegistry,
    sequencer: ReadSequencer,
    transport: T,
    timing: SchedulerTiming,
}

impl<T: RegisterTransport + 'static> DeviceScheduler<T> {
    pub fn new(
        registry: SharedRegistry,
        sequencer: ReadSequencer,
        transport: T,
        timing: SchedulerTiming,
    ) -> Self {
        Self {
            registry,
            sequencer,
            transport,
            timing,
        }
    }

    /// Run cycles until `shutdown` turns `true` or its sender is dropped.
    ///
    /// Shutdown is observed while waiting for the next slot or cycle. A
    /// sequence that has already started is allowed to finish.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> T {
        info!(
            device_budget = ?self.timing.device_budget,
            idle_backoff = ?self.timing.idle_backoff,
            "Device scheduler started"
        );

        loop {
            let cycle_start = Instant::now();
            let devices = self.registry.read().all();
            let plan = CyclePlan::build(&devices, &self.timing);

            match &plan {
                CyclePlan::Idle { recheck_after } => {
                    debug!(?recheck_after, "No registered device, waiting");
                }
                CyclePlan::Cycle {
                    next_cycle_after, ..
                } => {
                    debug!(
                        devices = devices.len(),
                        ?next_cycle_after,
                        "Scheduled to restart reading sensor values"
                    );
                }
            }

            for slot in plan.slots() {
                let slot_start = after(cycle_start, slot.offset);
                if !wait_until(slot_start, &mut shutdown).await {
                    break;
                }

                let late = Instant::now().saturating_duration_since(slot_start);
                if !late.is_zero() {
                    warn!(
                        device = %slot.address,
                        ?late,
                        "Previous sequence overran its slot"
                    );
                }

                self.sequencer.run(&mut self.transport, slot.address).await;
            }

            let next_cycle = after(cycle_start, plan.next_cycle_after());
            if !wait_until(next_cycle, &mut shutdown).await {
                break;
            }
        }

        info!("Device scheduler stopped");
        self.transport
    }

    /// Start the scheduler on its own task.
    pub fn spawn(self) -> SchedulerHandle<T> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));

        SchedulerHandle { shutdown_tx, task }
    }
}

/// `start + offset`, clamped to a far-future instant instead of overflowing.
fn after(start: Instant, offset: Duration) -> Instant {
    start
        .checked_add(offset)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// Roughly 30 years.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Sleep until `deadline`. Returns `false` if shutdown was requested first.
async fn wait_until(deadline: Instant, shutdown: &mut watch::Receiver<bool>) -> bool {
    loop {
        if *shutdown.borrow_and_update() {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return true,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}

/// Handle to a spawned [`DeviceScheduler`].
pub struct SchedulerHandle<T> {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<T>,
}

impl<T> SchedulerHandle<T> {
    /// Stop scheduling new sequences and wait for the task to end.
    ///
    /// Returns the transport once the in-flight sequence (if any) completes.
    pub async fn shutdown(self) -> Option<T> {
        let _ = self.shutdown_tx.send(true);
        match self.task.await {
            Ok(transport) => Some(transport),
            Err(e) => {
                warn!(error = %e, "Device scheduler task did not finish cleanly");
                None
            }
        }
    }

    /// Cancel the scheduler immediately, including any in-flight read.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
