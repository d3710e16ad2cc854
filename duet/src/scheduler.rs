//! The two-context cooperative scheduler.
//!
//! The thread that calls [`Scheduler::start`] becomes the platform context and runs
//! the tick loop. A spawned thread becomes the user context and runs the
//! [`Application`]. Control moves between them only through a pair of
//! [`HandoffToken`]s, so at any time exactly one of them runs.

use core::{cell::RefCell, sync::atomic::Ordering};
use std::{
    sync::Arc,
    thread::{self, JoinHandle, ThreadId},
    time::Duration,
};

use critical_section::Mutex;
use portable_atomic::AtomicBool;

use crate::{
    Error,
    context::{ExecutionContext, SchedulerState, StateCell},
    deferred::DeferredQueue,
    timer::{Deadline, TimerCallback, TimerService},
    token::HandoffToken,
};

/// Set while a `Scheduler` exists. Only one is meaningful per process.
static INSTANCE_ALIVE: AtomicBool = AtomicBool::new(false);

#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub user_stack_size: Option<usize>,
}

impl SchedulerConfig {
    /// Sets the sleep between platform ticks. Zero means no sleep.
    pub fn with_tick_interval(self, tick_interval: Duration) -> Self {
        Self {
            tick_interval,
            ..self
        }
    }

    pub fn with_user_stack_size(self, user_stack_size: usize) -> Self {
        Self {
            user_stack_size: Some(user_stack_size),
            ..self
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1),
            user_stack_size: None,
        }
    }
}

/// Application code run by the user context.
pub trait Application: Send + 'static {
    /// Runs once, on the first activation, before the first `run`.
    fn setup(&mut self, _cx: &SchedulerHandle) {}

    /// Runs once per activation.
    fn run(&mut self, cx: &SchedulerHandle);
}

impl<F: FnMut(&SchedulerHandle) + Send + 'static> Application for F {
    fn run(&mut self, cx: &SchedulerHandle) {
        self(cx)
    }
}

/// Request for control to pass to the user context at the platform's next check.
struct WakeRequest(AtomicBool);

impl WakeRequest {
    const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Clears the request, returning whether it was set.
    fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

struct Shared {
    platform_token: HandoffToken,
    user_token: HandoffToken,
    wake: WakeRequest,
    stop_requested: AtomicBool,
    state: StateCell,
    user_thread: Mutex<RefCell<Option<ThreadId>>>,
    deadline: Deadline,
    queue: Arc<DeferredQueue>,
    timers: Arc<dyn TimerService>,
}

impl Shared {
    fn is_stopping(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }
}

pub struct Scheduler {
    handle: SchedulerHandle,
    config: SchedulerConfig,
    started: AtomicBool,
}

impl Scheduler {
    /// Creates the scheduler. `timers` backs [`SchedulerHandle::delay`].
    ///
    /// Returns `None` if another `Scheduler` is still alive in this process.
    pub fn init(config: SchedulerConfig, timers: Arc<dyn TimerService>) -> Option<Self> {
        if INSTANCE_ALIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Scheduler is already initialized
            return None;
        }

        let shared = Arc::new(Shared {
            platform_token: HandoffToken::new(),
            user_token: HandoffToken::new(),
            wake: WakeRequest::new(),
            stop_requested: AtomicBool::new(false),
            state: StateCell::new(),
            user_thread: Mutex::new(RefCell::new(None)),
            deadline: Deadline::new(),
            queue: Arc::new(DeferredQueue::new()),
            timers,
        });

        Some(Scheduler {
            handle: SchedulerHandle { shared },
            config,
            started: AtomicBool::new(false),
        })
    }

    /// Runs the platform loop on the calling thread until stopped.
    ///
    /// Spawns the user context, waits until it is parked, then repeatedly calls
    /// `platform_tick`, sleeps the configured tick interval and, when a wake is
    /// pending, hands control to the user context until it hands it back.
    ///
    /// A panic in the application is re-raised here after the user context exits.
    pub fn start<T, A>(&self, mut platform_tick: T, app: A) -> Result<(), Error>
    where
        T: FnMut(),
        A: Application,
    {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyStarted);
        }

        let shared = &*self.handle.shared;

        let mut builder = thread::Builder::new().name("duet-user".into());
        if let Some(size) = self.config.user_stack_size {
            builder = builder.stack_size(size);
        }
        let handle = self.handle.clone();
        let join = builder
            .spawn(move || user_main(handle, app))
            .or(Err(Error::SpawnFailed))?;

        critical_section::with(|cs| {
            shared.user_thread.replace(cs, Some(join.thread().id()));
        });

        let mut user = UserThread {
            shared,
            join: Some(join),
        };

        // The user context releases this token right before parking on its own.
        shared.platform_token.wait();
        shared.state.activate(ExecutionContext::Platform);

        info!(
            "Scheduler started (tick interval {:?})",
            self.config.tick_interval
        );

        // First activation happens on the first iteration
        shared.wake.request();

        while !shared.is_stopping() {
            platform_tick();

            if !self.config.tick_interval.is_zero() {
                thread::sleep(self.config.tick_interval);
            }

            if shared.is_stopping() {
                break;
            }

            if shared.wake.take() {
                trace!("Handoff to user context");
                shared.state.activate(ExecutionContext::User);
                shared.user_token.release();
                shared.platform_token.wait();
            }
        }

        if let Err(payload) = user.shutdown() {
            std::panic::resume_unwind(payload);
        }

        Ok(())
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    pub fn queue(&self) -> &Arc<DeferredQueue> {
        self.handle.queue()
    }

    pub fn stop(&self) {
        self.handle.stop()
    }

    pub fn state(&self) -> SchedulerState {
        self.handle.state()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let shared = &self.handle.shared;
        if let Some(timer) = shared.deadline.disarm() {
            shared.timers.disarm(timer);
        }
        INSTANCE_ALIVE.store(false, Ordering::Release);
    }
}

/// Joins the user context on shutdown, including when the platform tick unwinds.
struct UserThread<'a> {
    shared: &'a Shared,
    join: Option<JoinHandle<()>>,
}

impl UserThread<'_> {
    fn shutdown(&mut self) -> thread::Result<()> {
        let Some(join) = self.join.take() else {
            return Ok(());
        };

        self.shared.stop_requested.store(true, Ordering::Release);
        self.shared.user_token.release();
        let result = join.join();

        if let Some(timer) = self.shared.deadline.disarm() {
            self.shared.timers.disarm(timer);
        }
        self.shared.state.store(SchedulerState::Stopped);

        info!("Scheduler stopped");

        result
    }
}

impl Drop for UserThread<'_> {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Hands control back to the platform when the user context exits, even by panic.
struct ExitGuard<'a>(&'a Shared);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("User context panicked, stopping the scheduler");
        }
        self.0.stop_requested.store(true, Ordering::Release);
        self.0.state.activate(ExecutionContext::Platform);
        self.0.platform_token.release();
    }
}

fn user_main<A: Application>(handle: SchedulerHandle, mut app: A) {
    let shared = &*handle.shared;
    let _exit = ExitGuard(shared);
    let mut initialized = false;

    shared.platform_token.release();

    loop {
        shared.user_token.wait();
        if shared.is_stopping() {
            break;
        }

        handle.run_once_as_user(&mut app, &mut initialized);

        if shared.is_stopping() {
            break;
        }
    }

    debug!("User context finished");
}

/// Cloneable access to a scheduler, usable from any thread.
///
/// Yielding operations (`yield_now`, `suspend`, `delay`) must be called from the
/// user context; called anywhere else they abort the process.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
}

impl SchedulerHandle {
    /// One user-context activation: setup on the first one, then the application
    /// body, then the deferred flush, then control goes back to the platform.
    fn run_once_as_user<A: Application>(&self, app: &mut A, initialized: &mut bool) {
        if !*initialized {
            *initialized = true;
            app.setup(self);
        }

        app.run(self);

        let once = self.shared.queue.flush_once();
        let recurring = self.shared.queue.flush_recurring();
        if once + recurring > 0 {
            trace!(
                "Flushed {} one-shot and {} recurring callbacks",
                once, recurring
            );
        }

        self.shared.wake.request();
        self.shared.state.activate(ExecutionContext::Platform);
        self.shared.platform_token.release();
    }

    /// Requests that control pass to the user context at the platform's next check.
    ///
    /// Callable from any thread, including timer and interrupt contexts.
    pub fn schedule(&self) {
        self.shared.wake.request();
    }

    /// Whether the calling thread is the user context.
    pub fn can_yield(&self) -> bool {
        let current = thread::current().id();
        critical_section::with(|cs| *self.shared.user_thread.borrow_ref(cs) == Some(current))
    }

    /// Hands control to the platform without requesting a wake.
    ///
    /// Returns once something else requests one (a deadline, `schedule`, a waker),
    /// or right away once a stop has been requested. Wait loops built on it must
    /// check [`is_stopping`](Self::is_stopping), since nothing wakes them after that.
    pub fn suspend(&self) {
        self.assert_user_context("suspend");
        self.hand_to_platform();
    }

    /// Cooperative yield: requests a wake, hands control to the platform and
    /// returns after the platform's next check.
    ///
    /// After a stop request it returns immediately and the platform no longer
    /// ticks, so loops waiting on platform-side progress must check
    /// [`is_stopping`](Self::is_stopping).
    pub fn yield_now(&self) {
        self.assert_user_context("yield_now");
        self.shared.wake.request();
        self.hand_to_platform();
    }

    /// Suspends the user context for at least `duration`.
    ///
    /// A zero duration is a plain [`yield_now`](Self::yield_now). Otherwise the
    /// wake comes from a deadline armed on the timer service; the platform keeps
    /// ticking in the meantime.
    pub fn delay(&self, duration: Duration) {
        self.assert_user_context("delay");
        if duration.is_zero() {
            return self.yield_now();
        }

        let shared = &self.shared;
        let (generation, stale) = shared.deadline.arm();
        if let Some(stale) = stale {
            shared.timers.disarm(stale);
        }

        let weak = Arc::downgrade(shared);
        let on_fire: TimerCallback = Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                if shared.deadline.fire(generation) {
                    shared.wake.request();
                }
            }
        });

        match shared.timers.arm(duration, on_fire) {
            Ok(timer) => shared.deadline.attach(generation, timer),
            Err(err) => {
                warn!("Cannot arm delay deadline ({}), yielding instead", err);
                shared.deadline.disarm();
                return self.yield_now();
            }
        }

        // Wakes requested by others before the deadline fires do not end the delay.
        while !shared.deadline.has_fired(generation) && !shared.is_stopping() {
            self.hand_to_platform();
        }

        if let Some(timer) = shared.deadline.disarm() {
            shared.timers.disarm(timer);
        }
    }

    /// Requests shutdown.
    ///
    /// Only sets the stop flag; neither handoff token is released here. The
    /// platform notices the flag between ticks, stops ticking, and during shutdown
    /// releases a suspended user context itself, so the two never overlap.
    /// After this call, yielding operations return without blocking and a
    /// pending `delay` ends early.
    pub fn stop(&self) {
        info!("Stop requested");
        self.shared.stop_requested.store(true, Ordering::Release);
    }

    pub fn is_stopping(&self) -> bool {
        self.shared.is_stopping()
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.state.load()
    }

    /// The context currently holding control, if the scheduler is running.
    pub fn current_context(&self) -> Option<ExecutionContext> {
        match self.state() {
            SchedulerState::Running(context) => Some(context),
            _ => None,
        }
    }

    pub fn queue(&self) -> &Arc<DeferredQueue> {
        &self.shared.queue
    }

    fn hand_to_platform(&self) {
        if self.shared.is_stopping() {
            return;
        }

        trace!("Handoff to platform context");
        self.shared.state.activate(ExecutionContext::Platform);
        self.shared.platform_token.release();
        self.shared.user_token.wait();
    }

    fn assert_user_context(&self, operation: &str) {
        if !self.can_yield() {
            // No way to resume: the platform owns the loop that would have to do it.
            error!("{}() called outside the user context", operation);
            std::process::abort();
        }
    }
}
