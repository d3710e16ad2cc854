//! One-shot timer interface and the delay deadline built on it.
//!
//! The deadline is generation-counted. A firing carries the generation it was
//! armed with and is ignored unless that arming is still current, which makes a
//! firing that races with (or arrives after) a disarm a no-op.

use core::cell::RefCell;
use std::time::Duration;

use critical_section::Mutex;

use crate::Error;

/// Identifies an armed timer within its `TimerService`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

pub type TimerCallback = Box<dyn FnOnce() + Send>;

/// One-shot timers provided by the environment.
pub trait TimerService: Send + Sync {
    /// Runs `callback` once, `after` from now, on a context of the implementation's choosing.
    fn arm(&self, after: Duration, callback: TimerCallback) -> Result<TimerId, Error>;

    /// Cancels the timer if it has not fired yet.
    ///
    /// Unknown or already fired ids are ignored. The callback may still run
    /// if it was already being dispatched.
    fn disarm(&self, id: TimerId);
}

struct DeadlineSlot {
    generation: u64,
    armed: bool,
    fired: bool,
    timer: Option<TimerId>,
}

/// At most one pending timed wake.
pub struct Deadline {
    slot: Mutex<RefCell<DeadlineSlot>>,
}

impl Deadline {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(RefCell::new(DeadlineSlot {
                generation: 0,
                armed: false,
                fired: false,
                timer: None,
            })),
        }
    }

    /// Starts a new arming and returns its generation.
    ///
    /// Any earlier arming becomes stale; its timer id is returned so the caller
    /// can cancel it.
    pub fn arm(&self) -> (u64, Option<TimerId>) {
        critical_section::with(|cs| {
            let mut slot = self.slot.borrow_ref_mut(cs);
            slot.generation = slot.generation.wrapping_add(1);
            slot.armed = true;
            slot.fired = false;
            (slot.generation, slot.timer.take())
        })
    }

    /// Records the timer backing arming `generation`. Ignored once that arming is over.
    pub fn attach(&self, generation: u64, timer: TimerId) {
        critical_section::with(|cs| {
            let mut slot = self.slot.borrow_ref_mut(cs);
            if slot.armed && slot.generation == generation {
                slot.timer = Some(timer);
            }
        })
    }

    /// Called from the timer callback. Returns `true` if this firing is current
    /// and should produce a wake.
    pub fn fire(&self, generation: u64) -> bool {
        critical_section::with(|cs| {
            let mut slot = self.slot.borrow_ref_mut(cs);
            if slot.armed && slot.generation == generation {
                slot.armed = false;
                slot.fired = true;
                slot.timer = None;
                true
            } else {
                false
            }
        })
    }

    /// Whether arming `generation` has fired.
    pub fn has_fired(&self, generation: u64) -> bool {
        critical_section::with(|cs| {
            let slot = self.slot.borrow_ref(cs);
            slot.generation == generation && slot.fired
        })
    }

    pub fn is_armed(&self) -> bool {
        critical_section::with(|cs| self.slot.borrow_ref(cs).armed)
    }

    /// Cancels the current arming. Idempotent.
    ///
    /// Returns the timer id to cancel with the `TimerService`, if one is still attached.
    pub fn disarm(&self) -> Option<TimerId> {
        critical_section::with(|cs| {
            let mut slot = self.slot.borrow_ref_mut(cs);
            slot.armed = false;
            slot.timer.take()
        })
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::new()
    }
}
