//! Interface to the environment services the core consumes but does not implement.
//!
//! Implementations live in separate crates (`duet-host` for std hosts).

use crate::{Error, interrupt::InterruptRoute};

/// Pin identifier.
pub type Pin = u8;

/// Highest pin identifier (exclusive) that can carry an interrupt binding.
pub const MAX_PINS: Pin = 16;

/// Sampled logic level of a digital pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

/// Condition under which a pin interrupt fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TriggerMode {
    Rising,
    Falling,
    Change,
    /// Level-triggered: fires on every sample that reads low.
    OnLow,
    /// Level-triggered: fires on every sample that reads high.
    OnHigh,
}

impl TriggerMode {
    /// Whether a pin moving from `from` to `to` fires an interrupt in this mode.
    pub fn is_triggered_by(self, from: Level, to: Level) -> bool {
        match self {
            TriggerMode::Rising => from == Level::Low && to == Level::High,
            TriggerMode::Falling => from == Level::High && to == Level::Low,
            TriggerMode::Change => from != to,
            TriggerMode::OnLow => to == Level::Low,
            TriggerMode::OnHigh => to == Level::High,
        }
    }
}

/// Monotonic time source.
pub trait Clock: Send + Sync {
    /// Microseconds since an arbitrary fixed origin. Never decreases.
    fn micros(&self) -> u64;

    fn millis(&self) -> u64 {
        self.micros() / 1_000
    }
}

/// Digital pins and their hardware interrupt triggers.
pub trait DigitalPins: Send + Sync {
    /// Number of pins (identifiers `0..pin_count()`).
    fn pin_count(&self) -> Pin;

    /// Whether `mode` can be attached to `pin`.
    fn supports(&self, pin: Pin, mode: TriggerMode) -> bool;

    fn read(&self, pin: Pin) -> Level;

    /// Registers `route` as the interrupt handler of `pin`, replacing any
    /// handler already attached. On error the previous handler must stay attached.
    ///
    /// The implementation must call `route.fire(self)` from its interrupt
    /// context whenever `mode` triggers.
    fn attach(&self, pin: Pin, mode: TriggerMode, route: InterruptRoute) -> Result<(), Error>;

    /// Removes the handler of `pin`. Removing an absent handler is a no-op.
    fn detach(&self, pin: Pin);
}
