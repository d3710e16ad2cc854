//! Deferred callbacks, queued from any context and run by the scheduler on the user context.
//!
//! Two lists are kept: one-shot entries (FIFO, each runs once) and recurring entries
//! (run on every flush until cancelled). Both have a fixed capacity; a full list is
//! reported to the caller and never corrupts queued state.

use core::{cell::RefCell, sync::atomic::Ordering};
use std::sync::Arc;

use critical_section::Mutex;
use heapless::{Deque, Vec};
use portable_atomic::{AtomicBool, AtomicU32};

use crate::{
    Error,
    interrupt::{EventCallback, InterruptEvent},
};

pub const ONCE_CAPACITY: usize = 32;
pub const RECURRING_CAPACITY: usize = 32;

enum OnceEntry {
    Boxed(Box<dyn FnOnce() + Send>),
    /// Queued from interrupt context; carrying a shared callback keeps that path allocation-free.
    Event(Arc<EventCallback>, InterruptEvent),
}

impl OnceEntry {
    fn run(self) {
        match self {
            OnceEntry::Boxed(callback) => callback(),
            OnceEntry::Event(callback, event) => callback(event),
        }
    }
}

struct RecurringEntry {
    live: Arc<AtomicBool>,
    callback: Box<dyn FnMut() + Send>,
}

struct RecurringList {
    entries: Vec<RecurringEntry, RECURRING_CAPACITY>,
    /// Entries taken out by a flush in progress. They still occupy capacity.
    in_flight: usize,
}

/// Cancellation handle of a recurring callback.
///
/// Dropping the handle does not cancel the callback.
#[derive(Clone, Debug)]
pub struct RecurringHandle {
    live: Arc<AtomicBool>,
}

impl RecurringHandle {
    /// `false` once the callback has been cancelled.
    pub fn is_active(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

pub struct DeferredQueue {
    once: Mutex<RefCell<Deque<OnceEntry, ONCE_CAPACITY>>>,
    recurring: Mutex<RefCell<RecurringList>>,
    /// Set while `flush_recurring` holds the recurring entries.
    flushing: AtomicBool,
    dropped: AtomicU32,
}

impl DeferredQueue {
    pub const fn new() -> Self {
        Self {
            once: Mutex::new(RefCell::new(Deque::new())),
            recurring: Mutex::new(RefCell::new(RecurringList {
                entries: Vec::new(),
                in_flight: 0,
            })),
            flushing: AtomicBool::new(false),
            dropped: AtomicU32::new(0),
        }
    }

    /// Queues `callback` to run once at the next flush.
    pub fn enqueue_once<F: FnOnce() + Send + 'static>(&self, callback: F) -> Result<(), Error> {
        self.push_once(OnceEntry::Boxed(Box::new(callback)))
    }

    /// Queues delivery of `event` to `callback`. Does not allocate.
    ///
    /// A full queue counts the event as dropped.
    pub(crate) fn enqueue_event(
        &self,
        callback: Arc<EventCallback>,
        event: InterruptEvent,
    ) -> Result<(), Error> {
        let result = self.push_once(OnceEntry::Event(callback, event));
        if result.is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    fn push_once(&self, entry: OnceEntry) -> Result<(), Error> {
        critical_section::with(|cs| {
            self.once
                .borrow_ref_mut(cs)
                .push_back(entry)
                .or(Err(Error::QueueFull))
        })
    }

    /// Registers `callback` to run on every flush until cancelled.
    pub fn enqueue_recurring<F: FnMut() + Send + 'static>(
        &self,
        callback: F,
    ) -> Result<RecurringHandle, Error> {
        let live = Arc::new(AtomicBool::new(true));
        let entry = RecurringEntry {
            live: live.clone(),
            callback: Box::new(callback),
        };

        critical_section::with(|cs| {
            let mut list = self.recurring.borrow_ref_mut(cs);
            if list.entries.len() + list.in_flight >= RECURRING_CAPACITY {
                return Err(Error::QueueFull);
            }
            list.entries.push(entry).or(Err(Error::QueueFull))
        })?;

        trace!("Recurring callback registered");

        Ok(RecurringHandle { live })
    }

    /// Marks the callback of `handle` inert. Idempotent.
    ///
    /// May be called from inside that callback; it will not run again.
    pub fn cancel_recurring(&self, handle: &RecurringHandle) {
        handle.live.store(false, Ordering::Release);
    }

    /// Runs every one-shot entry that was queued when the flush began, oldest first.
    ///
    /// Each entry is removed before it runs. Entries queued while flushing run at
    /// the next flush. Returns the number of entries run.
    pub fn flush_once(&self) -> usize {
        let pending = critical_section::with(|cs| self.once.borrow_ref(cs).len());

        let mut ran = 0;
        for _ in 0..pending {
            // Producers only push to the back, so the front holds the entries counted above.
            let Some(entry) = critical_section::with(|cs| self.once.borrow_ref_mut(cs).pop_front())
            else {
                break;
            };
            entry.run();
            ran += 1;
        }

        ran
    }

    /// Runs every live recurring entry in registration order.
    ///
    /// Liveness is checked right before each invocation, so an entry cancelled
    /// earlier in the same pass is skipped. Entries registered during the pass
    /// start at the next flush. Returns the number of entries run.
    ///
    /// A flush requested from inside a recurring callback runs nothing and returns 0.
    pub fn flush_recurring(&self) -> usize {
        if self.flushing.swap(true, Ordering::Acquire) {
            return 0;
        }

        let mut batch = critical_section::with(|cs| {
            let mut list = self.recurring.borrow_ref_mut(cs);
            let batch = core::mem::take(&mut list.entries);
            list.in_flight = batch.len();
            batch
        });

        let mut ran = 0;
        for entry in batch.iter_mut() {
            if entry.live.load(Ordering::Acquire) {
                (entry.callback)();
                ran += 1;
            }
        }

        batch.retain(|entry| entry.live.load(Ordering::Acquire));

        critical_section::with(|cs| {
            let mut list = self.recurring.borrow_ref_mut(cs);
            let added = core::mem::take(&mut list.entries);
            for entry in added {
                // `in_flight` reserved room for the whole batch
                batch.push(entry).unwrap_or_else(|_| unreachable!());
            }
            list.entries = batch;
            list.in_flight = 0;
        });

        self.flushing.store(false, Ordering::Release);

        ran
    }

    /// Number of one-shot entries waiting for the next flush.
    pub fn pending_once(&self) -> usize {
        critical_section::with(|cs| self.once.borrow_ref(cs).len())
    }

    /// Number of registered recurring entries, including cancelled ones not yet swept.
    pub fn recurring_len(&self) -> usize {
        critical_section::with(|cs| {
            let list = self.recurring.borrow_ref(cs);
            list.entries.len() + list.in_flight
        })
    }

    /// Interrupt events discarded because the queue was full.
    pub fn dropped_events(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for DeferredQueue {
    fn default() -> Self {
        Self::new()
    }
}
