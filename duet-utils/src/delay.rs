//! Delays that suspend the user context instead of busy looping.
//! The precision is limited by the timer service and the platform tick interval.

use std::{sync::Arc, time::Duration};

use duet::{Clock, SchedulerHandle};

/// `embedded-hal` delay for code running on the user context.
#[derive(Clone)]
pub struct Delay {
    handle: SchedulerHandle,
}

impl Delay {
    pub fn new(handle: SchedulerHandle) -> Self {
        Self { handle }
    }

    pub fn delay(&mut self, duration: Duration) {
        self.handle.delay(duration);
    }
}

impl embedded_hal::delay::DelayNs for Delay {
    fn delay_ns(&mut self, ns: u32) {
        self.delay(Duration::from_nanos(ns as u64));
    }

    fn delay_us(&mut self, us: u32) {
        self.delay(Duration::from_micros(us as u64));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay(Duration::from_millis(ms as u64));
    }
}

/// One step of a bounded wait that started at `start_ms`.
///
/// Returns `true` once `timeout_ms` has elapsed. Otherwise delays for at most
/// `interval_ms` (never past the timeout) and returns `false`, so callers can
/// re-check their condition between steps:
///
/// ```ignore
/// let start = clock.millis();
/// while !ready() {
///     if try_delay(&cx, &clock, start, 500, 10) {
///         break; // timed out
///     }
/// }
/// ```
pub fn try_delay(
    handle: &SchedulerHandle,
    clock: &dyn Clock,
    start_ms: u64,
    timeout_ms: u64,
    interval_ms: u64,
) -> bool {
    let expired = clock.millis().saturating_sub(start_ms);
    if expired >= timeout_ms {
        return true;
    }

    handle.delay(Duration::from_millis((timeout_ms - expired).min(interval_ms)));
    false
}

/// Yields only if at least `interval_us` passed since the last yield through it.
///
/// For long computations on the user context that should let the platform run
/// now and then without paying for a handoff on every iteration.
pub struct OptimisticYield {
    handle: SchedulerHandle,
    clock: Arc<dyn Clock>,
    interval_us: u64,
    last_us: u64,
}

impl OptimisticYield {
    pub fn new(handle: SchedulerHandle, clock: Arc<dyn Clock>, interval_us: u64) -> Self {
        let last_us = clock.micros();
        Self {
            handle,
            clock,
            interval_us,
            last_us,
        }
    }

    /// Returns `true` if it yielded.
    pub fn poll(&mut self) -> bool {
        let now = self.clock.micros();
        if now.saturating_sub(self.last_us) < self.interval_us {
            return false;
        }

        self.handle.yield_now();
        self.last_us = self.clock.micros();
        true
    }
}
