//! Simulated digital pins.
//!
//! Whoever changes a pin level (a test, a platform tick, another thread) plays the
//! part of the interrupt controller: a matching trigger fires the attached route on
//! that caller's thread.

use core::{cell::RefCell, sync::atomic::Ordering};
use std::sync::Arc;

use critical_section::Mutex;
use duet::{
    DigitalPins, Error, InterruptRoute, Level, Pin, TriggerMode,
    env::MAX_PINS,
};
use portable_atomic::AtomicU32;

/// GPIO0..GPIO16. The last one has no interrupt capability.
pub const NUM_PINS: usize = 17;

pub struct SimulatedPins {
    levels: Mutex<RefCell<[Level; NUM_PINS]>>,
    routes: Mutex<RefCell<[Option<Arc<InterruptRoute>>; NUM_PINS]>>,
    fired: AtomicU32,
}

impl SimulatedPins {
    /// All pins start low with nothing attached.
    pub fn new() -> Self {
        Self {
            levels: Mutex::new(RefCell::new([Level::Low; NUM_PINS])),
            routes: Mutex::new(RefCell::new([const { None }; NUM_PINS])),
            fired: AtomicU32::new(0),
        }
    }

    /// Drives `pin` to `level`, firing its interrupt if the transition matches.
    ///
    /// Returns `true` if an interrupt fired and its event was queued.
    pub fn set_level(&self, pin: Pin, level: Level) -> bool {
        let Some(index) = index(pin) else {
            return false;
        };

        let (previous, route) = critical_section::with(|cs| {
            let mut levels = self.levels.borrow_ref_mut(cs);
            let previous = core::mem::replace(&mut levels[index], level);
            (previous, self.routes.borrow_ref(cs)[index].clone())
        });

        match route {
            Some(route) if route.mode().is_triggered_by(previous, level) => {
                self.fired.fetch_add(1, Ordering::Relaxed);
                route.fire(self)
            }
            _ => false,
        }
    }

    /// Inverts `pin` and returns the new level.
    pub fn toggle(&self, pin: Pin) -> Level {
        let level = match self.read(pin) {
            Level::Low => Level::High,
            Level::High => Level::Low,
        };
        self.set_level(pin, level);
        level
    }

    /// Interrupts fired so far, including ones whose event was dropped.
    pub fn interrupts_fired(&self) -> u32 {
        self.fired.load(Ordering::Relaxed)
    }

    pub fn is_attached(&self, pin: Pin) -> bool {
        index(pin).is_some_and(|index| {
            critical_section::with(|cs| self.routes.borrow_ref(cs)[index].is_some())
        })
    }
}

impl Default for SimulatedPins {
    fn default() -> Self {
        Self::new()
    }
}

fn index(pin: Pin) -> Option<usize> {
    let index = pin as usize;
    (index < NUM_PINS).then_some(index)
}

impl DigitalPins for SimulatedPins {
    fn pin_count(&self) -> Pin {
        NUM_PINS as Pin
    }

    fn supports(&self, pin: Pin, _mode: TriggerMode) -> bool {
        pin < MAX_PINS
    }

    fn read(&self, pin: Pin) -> Level {
        match index(pin) {
            Some(index) => critical_section::with(|cs| self.levels.borrow_ref(cs)[index]),
            None => Level::Low,
        }
    }

    fn attach(&self, pin: Pin, mode: TriggerMode, route: InterruptRoute) -> Result<(), Error> {
        if !self.supports(pin, mode) {
            return Err(Error::UnsupportedMode);
        }
        let index = index(pin).ok_or(Error::InvalidPin)?;

        let route = Arc::new(route);
        let previous =
            critical_section::with(|cs| self.routes.borrow_ref_mut(cs)[index].replace(route));
        drop(previous);

        Ok(())
    }

    fn detach(&self, pin: Pin) {
        if let Some(index) = index(pin) {
            let route = critical_section::with(|cs| self.routes.borrow_ref_mut(cs)[index].take());
            // Dropped outside the critical section
            drop(route);
        }
    }
}
