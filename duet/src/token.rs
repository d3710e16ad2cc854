use core::{cell::RefCell, sync::atomic::Ordering};
use std::thread::{self, Thread};

use critical_section::Mutex;
use portable_atomic::AtomicBool;

/// One-slot signal used to pass control between the two contexts.
///
/// Similar to a binary semaphore: `release` makes the token available, `wait`
/// blocks until it is available and consumes it. Releasing an already available
/// token has no further effect, so at most one wakeup is ever pending.
/// A release that happens before the matching `wait` is never lost.
pub struct HandoffToken {
    available: AtomicBool,
    waiter: Mutex<RefCell<Option<Thread>>>,
}

impl HandoffToken {
    pub const fn new() -> Self {
        Self {
            available: AtomicBool::new(false),
            waiter: Mutex::new(RefCell::new(None)),
        }
    }

    /// Blocks the calling thread until the token is released, then consumes it.
    pub fn wait(&self) {
        // Register before checking, so that a release racing with this call
        // either sees the waiter or leaves `available` set for the check below.
        critical_section::with(|cs| {
            self.waiter.replace(cs, Some(thread::current()));
        });

        while self
            .available
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Spurious returns are fine, the loop re-checks.
            thread::park();
        }
    }

    /// Makes the token available and wakes the waiting thread, if any.
    ///
    /// Returns `false` if the token was already available (the release was absorbed).
    pub fn release(&self) -> bool {
        let was_available = self.available.swap(true, Ordering::AcqRel);

        let waiter = critical_section::with(|cs| self.waiter.borrow_ref(cs).clone());
        if let Some(waiter) = waiter {
            waiter.unpark();
        }

        !was_available
    }

    /// Returns `true` if the token has been released but not yet consumed.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }
}

impl Default for HandoffToken {
    fn default() -> Self {
        Self::new()
    }
}
