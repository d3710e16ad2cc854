//! Pin interrupts delivered as deferred callbacks.
//!
//! The interrupt handler only samples the pin and the clock, then queues a one-shot
//! entry. The user callback runs later, on the user context, when the scheduler flushes.

use core::cell::RefCell;
use std::sync::Arc;

use critical_section::Mutex;

use crate::{
    Error,
    deferred::DeferredQueue,
    env::{Clock, DigitalPins, Level, MAX_PINS, Pin, TriggerMode},
};

/// Callback bound to a pin.
pub type EventCallback = dyn Fn(InterruptEvent) + Send + Sync;

/// Snapshot of one interrupt firing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterruptEvent {
    pin: Pin,
    level: Level,
    micros: u64,
}

impl InterruptEvent {
    pub(crate) fn new(pin: Pin, level: Level, micros: u64) -> Self {
        Self { pin, level, micros }
    }

    pub fn pin(&self) -> Pin {
        self.pin
    }

    /// Level read right after the trigger.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Monotonic timestamp of the firing, in microseconds.
    pub fn micros(&self) -> u64 {
        self.micros
    }
}

/// Everything an interrupt handler needs, built once when the pin is bound.
///
/// Owned by the `DigitalPins` implementation while attached.
pub struct InterruptRoute {
    pin: Pin,
    mode: TriggerMode,
    callback: Arc<EventCallback>,
    queue: Arc<DeferredQueue>,
    clock: Arc<dyn Clock>,
}

impl InterruptRoute {
    pub fn pin(&self) -> Pin {
        self.pin
    }

    pub fn mode(&self) -> TriggerMode {
        self.mode
    }

    /// Interrupt-context body. Captures the event and queues its delivery.
    ///
    /// Does not allocate and does not run user code. Returns `false` if the
    /// queue was full and the event was dropped.
    pub fn fire(&self, pins: &dyn DigitalPins) -> bool {
        let event = InterruptEvent::new(self.pin, pins.read(self.pin), self.clock.micros());
        self.queue
            .enqueue_event(self.callback.clone(), event)
            .is_ok()
    }
}

/// Binds pin interrupts to callbacks, at most one binding per pin.
pub struct InterruptBridge {
    pins: Arc<dyn DigitalPins>,
    clock: Arc<dyn Clock>,
    queue: Arc<DeferredQueue>,
    bindings: Mutex<RefCell<[Option<TriggerMode>; MAX_PINS as usize]>>,
}

impl InterruptBridge {
    pub fn new(
        pins: Arc<dyn DigitalPins>,
        clock: Arc<dyn Clock>,
        queue: Arc<DeferredQueue>,
    ) -> Self {
        Self {
            pins,
            clock,
            queue,
            bindings: Mutex::new(RefCell::new([None; MAX_PINS as usize])),
        }
    }

    /// Calls `callback` on the user context each time `mode` triggers on `pin`.
    ///
    /// Replaces any previous binding of `pin`. On failure (invalid pin,
    /// unsupported mode, or a refused attach) the previous binding is kept.
    pub fn bind<F>(&self, pin: Pin, mode: TriggerMode, callback: F) -> Result<(), Error>
    where
        F: Fn(InterruptEvent) + Send + Sync + 'static,
    {
        if pin >= MAX_PINS || pin >= self.pins.pin_count() {
            return Err(Error::InvalidPin);
        }
        if !self.pins.supports(pin, mode) {
            return Err(Error::UnsupportedMode);
        }

        let route = InterruptRoute {
            pin,
            mode,
            callback: Arc::new(callback),
            queue: self.queue.clone(),
            clock: self.clock.clone(),
        };
        // Replaces the previous route in place; on error the old one stays attached.
        self.pins.attach(pin, mode, route)?;

        critical_section::with(|cs| {
            self.bindings.borrow_ref_mut(cs)[pin as usize] = Some(mode);
        });

        debug!("Pin {} bound ({:?})", pin, mode);

        Ok(())
    }

    /// Removes the binding of `pin`, if any.
    ///
    /// Events captured before this call are still delivered.
    pub fn unbind(&self, pin: Pin) {
        if pin >= MAX_PINS {
            return;
        }

        let previous = critical_section::with(|cs| self.bindings.borrow_ref_mut(cs)[pin as usize].take());
        if previous.is_some() {
            self.pins.detach(pin);
            debug!("Pin {} unbound", pin);
        }
    }

    /// Trigger mode currently bound to `pin`.
    pub fn binding(&self, pin: Pin) -> Option<TriggerMode> {
        if pin >= MAX_PINS {
            return None;
        }
        critical_section::with(|cs| self.bindings.borrow_ref(cs)[pin as usize])
    }

    pub fn queue(&self) -> &Arc<DeferredQueue> {
        &self.queue
    }
}
