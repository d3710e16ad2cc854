//! Two cooperating execution contexts (platform and user) that strictly alternate,
//! plus a deferred-callback queue and a bridge that turns pin interrupts into
//! callbacks run on the user context.

#[macro_use]
mod log_wrapper;

pub mod context;
pub mod deferred;
pub mod env;
pub mod interrupt;
pub mod scheduler;
pub mod timer;
pub mod token;

pub use context::{ExecutionContext, SchedulerState};
pub use deferred::{DeferredQueue, RecurringHandle};
pub use env::{Clock, DigitalPins, Level, Pin, TriggerMode};
pub use interrupt::{InterruptBridge, InterruptEvent, InterruptRoute};
pub use scheduler::{Application, Scheduler, SchedulerConfig, SchedulerHandle};
pub use timer::{TimerCallback, TimerId, TimerService};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The deferred queue (or recurring list) has no free slot.
    QueueFull,
    InvalidPin,
    UnsupportedMode,
    TimerFull,
    AlreadyStarted,
    SpawnFailed,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            Error::QueueFull => "deferred queue is full",
            Error::InvalidPin => "invalid pin",
            Error::UnsupportedMode => "trigger mode not supported on this pin",
            Error::TimerFull => "no free timer slot",
            Error::AlreadyStarted => "scheduler already started",
            Error::SpawnFailed => "failed to spawn the user context",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {}
