//! Host (std) environment for `duet`: a monotonic clock, simulated GPIO with
//! edge and level interrupts, and a thread-serviced one-shot timer.

mod gpio;
mod timer;

use std::{sync::Arc, time::Instant};

use duet::{Clock, DeferredQueue, InterruptBridge, Scheduler, SchedulerConfig};

pub use gpio::{NUM_PINS, SimulatedPins};
pub use timer::HostTimer;

/// Monotonic clock counting from its creation.
#[derive(Clone, Copy, Debug)]
pub struct HostClock {
    origin: Instant,
}

impl HostClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for HostClock {
    fn micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// The services a scheduler and an interrupt bridge need on a host.
#[derive(Clone)]
pub struct HostEnv {
    pub clock: Arc<HostClock>,
    pub pins: Arc<SimulatedPins>,
    pub timers: Arc<HostTimer>,
}

impl HostEnv {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(HostClock::new()),
            pins: Arc::new(SimulatedPins::new()),
            timers: Arc::new(HostTimer::new()),
        }
    }

    /// Interrupt bridge over the simulated pins, feeding `queue`.
    pub fn bridge(&self, queue: Arc<DeferredQueue>) -> InterruptBridge {
        InterruptBridge::new(self.pins.clone(), self.clock.clone(), queue)
    }
}

impl Default for HostEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the scheduler with the host timer service.
///
/// Returns `None` if a scheduler already exists in this process.
pub fn init_scheduler(env: &HostEnv, config: SchedulerConfig) -> Option<Scheduler> {
    Scheduler::init(config, env.timers.clone())
}
