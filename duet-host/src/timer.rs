//! One-shot timers serviced by a dedicated thread.
//!
//! Pending timers are kept in a min-heap ordered by deadline; the service thread
//! sleeps until the earliest one is due, pops it and runs its callback with no
//! lock held.

use std::{
    cmp::Ordering,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use duet::{Error, TimerCallback, TimerId, TimerService};
use heapless::{BinaryHeap, binary_heap::Min};

const MAX_TIMER_REGS: usize = 32;

struct TimerRegistry {
    deadline: Instant,
    id: TimerId,
    callback: TimerCallback,
}

impl Ord for TimerRegistry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for TimerRegistry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Consistent with `Ord`: ids are unique, so equal keys mean the same registration.
impl PartialEq for TimerRegistry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}

impl Eq for TimerRegistry {}

struct TimerState {
    queue: BinaryHeap<TimerRegistry, Min, MAX_TIMER_REGS>,
    next_id: u64,
    shutdown: bool,
}

struct Inner {
    state: Mutex<TimerState>,
    changed: Condvar,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct HostTimer {
    inner: Arc<Inner>,
    service: Option<JoinHandle<()>>,
}

impl HostTimer {
    pub fn new() -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(TimerState {
                queue: BinaryHeap::new(),
                next_id: 0,
                shutdown: false,
            }),
            changed: Condvar::new(),
        });

        let service = {
            let inner = inner.clone();
            thread::Builder::new()
                .name("duet-timer".into())
                .spawn(move || service(&inner))
                .ok()
        };

        Self { inner, service }
    }

    /// Number of timers armed and not yet fired or disarmed.
    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }
}

impl Default for HostTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService for HostTimer {
    fn arm(&self, after: Duration, callback: TimerCallback) -> Result<TimerId, Error> {
        if self.service.is_none() {
            return Err(Error::TimerFull);
        }

        let mut state = self.inner.lock();
        let id = TimerId(state.next_id);
        let registry = TimerRegistry {
            deadline: Instant::now() + after,
            id,
            callback,
        };
        state.queue.push(registry).or(Err(Error::TimerFull))?;
        state.next_id += 1;
        drop(state);

        self.inner.changed.notify_one();
        Ok(id)
    }

    fn disarm(&self, id: TimerId) {
        let mut state = self.inner.lock();

        // Rebuild the heap without `id`; a fired or unknown id leaves it unchanged.
        let mut rebuilt = BinaryHeap::new();
        while let Some(registry) = state.queue.pop() {
            if registry.id != id {
                rebuilt
                    .push(registry)
                    .unwrap_or_else(|_| unreachable!());
            }
        }
        state.queue = rebuilt;
        drop(state);

        self.inner.changed.notify_one();
    }
}

impl Drop for HostTimer {
    fn drop(&mut self) {
        self.inner.lock().shutdown = true;
        self.inner.changed.notify_one();

        if let Some(service) = self.service.take() {
            // The last reference may be released by a timer callback
            if service.thread().id() != thread::current().id() {
                let _ = service.join();
            }
        }
    }
}

fn service(inner: &Inner) {
    let mut state = inner.lock();

    loop {
        if state.shutdown {
            break;
        }

        let now = Instant::now();
        match state.queue.peek().map(|top| top.deadline) {
            None => {
                state = inner
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            Some(deadline) if deadline <= now => {
                let Some(top) = state.queue.pop() else {
                    continue;
                };
                drop(state);
                (top.callback)();
                state = inner.lock();
            }
            Some(deadline) => {
                state = inner
                    .changed
                    .wait_timeout(state, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
        }
    }
}
