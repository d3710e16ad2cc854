//! Execution context identities and the scheduler lifecycle state.

use core::sync::atomic::Ordering;

use portable_atomic::AtomicU8;

/// One of the two mutually exclusive logical roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecutionContext {
    /// Runs the background tick loop. This is the thread that called `Scheduler::start`.
    Platform,
    /// Runs the application and flushes deferred callbacks.
    User,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Uninitialized,
    Running(ExecutionContext),
    Stopped,
}

const UNINITIALIZED: u8 = 0;
const PLATFORM_ACTIVE: u8 = 1;
const USER_ACTIVE: u8 = 2;
const STOPPED: u8 = 3;

/// Lock-free cell holding a `SchedulerState`.
///
/// Written by whichever context is about to release the other one's token, so
/// the value always names the context that holds (or is about to hold) control.
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(UNINITIALIZED))
    }

    pub(crate) fn load(&self) -> SchedulerState {
        match self.0.load(Ordering::Acquire) {
            PLATFORM_ACTIVE => SchedulerState::Running(ExecutionContext::Platform),
            USER_ACTIVE => SchedulerState::Running(ExecutionContext::User),
            STOPPED => SchedulerState::Stopped,
            _ => SchedulerState::Uninitialized,
        }
    }

    pub(crate) fn store(&self, state: SchedulerState) {
        let raw = match state {
            SchedulerState::Uninitialized => UNINITIALIZED,
            SchedulerState::Running(ExecutionContext::Platform) => PLATFORM_ACTIVE,
            SchedulerState::Running(ExecutionContext::User) => USER_ACTIVE,
            SchedulerState::Stopped => STOPPED,
        };
        self.0.store(raw, Ordering::Release);
    }

    pub(crate) fn activate(&self, context: ExecutionContext) {
        self.store(SchedulerState::Running(context));
    }
}
