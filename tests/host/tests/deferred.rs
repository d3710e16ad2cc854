// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test of deferred callbacks flushed by the scheduler

#[macro_use]
mod utils;

use core::sync::atomic::{AtomicU32, Ordering};
use std::{
    process::ExitCode,
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use duet::{Application, RecurringHandle, SchedulerHandle};

use crate::utils::{Outcome, setup};

fn main() -> ExitCode {
    let mut outcome = Outcome::default();
    outcome.check("one_shots_run_in_order_on_user_context", one_shots_run_in_order_on_user_context);
    outcome.check("one_shots_from_platform_run_on_user_context", one_shots_from_platform_run_on_user_context);
    outcome.check("nested_one_shot_waits_for_next_pass", nested_one_shot_waits_for_next_pass);
    outcome.check("recurring_cancels_itself", recurring_cancels_itself);
    outcome.exit_code()
}

fn one_shots_run_in_order_on_user_context() -> Result<(), String> {
    let (_env, scheduler) = setup(Duration::from_micros(100));
    let log: Arc<Mutex<Vec<(u32, bool)>>> = Arc::new(Mutex::new(Vec::new()));

    struct App {
        log: Arc<Mutex<Vec<(u32, bool)>>>,
        passes: u32,
    }

    impl Application for App {
        fn setup(&mut self, cx: &SchedulerHandle) {
            for i in 0..5 {
                let (log, handle) = (self.log.clone(), cx.clone());
                cx.queue()
                    .enqueue_once(move || log.lock().unwrap().push((i, handle.can_yield())))
                    .unwrap();
            }
        }

        fn run(&mut self, cx: &SchedulerHandle) {
            self.passes += 1;
            if self.passes == 2 {
                cx.stop();
            }
        }
    }

    scheduler
        .start(
            || {},
            App {
                log: log.clone(),
                passes: 0,
            },
        )
        .map_err(|e| e.to_string())?;

    let log = log.lock().unwrap();
    ensure!(
        *log == [(0, true), (1, true), (2, true), (3, true), (4, true)],
        "one-shot log: {:?}",
        *log
    );
    ensure!(scheduler.queue().pending_once() == 0, "entries left behind");

    Ok(())
}

fn one_shots_from_platform_run_on_user_context() -> Result<(), String> {
    const COUNT: u32 = 10;

    let (_env, scheduler) = setup(Duration::from_micros(100));
    let queue = scheduler.queue().clone();

    let queued = Arc::new(AtomicU32::new(0));
    let ran = Arc::new(AtomicU32::new(0));
    let off_user_thread = Arc::new(AtomicU32::new(0));

    let tick = {
        let (queued, ran, off_user_thread) = (queued.clone(), ran.clone(), off_user_thread.clone());
        move || {
            if queued.load(Ordering::SeqCst) == COUNT {
                return;
            }
            let (ran, off_user_thread) = (ran.clone(), off_user_thread.clone());
            let result = queue.enqueue_once(move || {
                if thread::current().name() != Some("duet-user") {
                    off_user_thread.fetch_add(1, Ordering::SeqCst);
                }
                ran.fetch_add(1, Ordering::SeqCst);
            });
            if result.is_ok() {
                queued.fetch_add(1, Ordering::SeqCst);
            }
        }
    };

    let app = {
        let ran = ran.clone();
        move |cx: &SchedulerHandle| {
            if ran.load(Ordering::SeqCst) == COUNT {
                cx.stop();
            }
        }
    };

    scheduler.start(tick, app).map_err(|e| e.to_string())?;

    ensure!(
        ran.load(Ordering::SeqCst) == COUNT,
        "{} of {} callbacks ran",
        ran.load(Ordering::SeqCst),
        COUNT
    );
    ensure!(
        off_user_thread.load(Ordering::SeqCst) == 0,
        "{} callbacks ran outside the user context",
        off_user_thread.load(Ordering::SeqCst)
    );

    Ok(())
}

fn nested_one_shot_waits_for_next_pass() -> Result<(), String> {
    let (_env, scheduler) = setup(Duration::from_micros(100));
    let pass = Arc::new(AtomicU32::new(0));
    let seen: Arc<Mutex<Vec<(&'static str, u32)>>> = Arc::new(Mutex::new(Vec::new()));

    let app = {
        let (pass, seen) = (pass.clone(), seen.clone());
        move |cx: &SchedulerHandle| {
            let current = pass.fetch_add(1, Ordering::SeqCst) + 1;
            match current {
                1 => {
                    let (pass, seen, queue) = (pass.clone(), seen.clone(), cx.queue().clone());
                    cx.queue()
                        .enqueue_once(move || {
                            seen.lock().unwrap().push(("outer", pass.load(Ordering::SeqCst)));
                            let (pass, seen) = (pass.clone(), seen.clone());
                            queue
                                .enqueue_once(move || {
                                    seen.lock().unwrap().push(("inner", pass.load(Ordering::SeqCst)))
                                })
                                .unwrap();
                        })
                        .unwrap();
                }
                3 => cx.stop(),
                _ => {}
            }
        }
    };

    scheduler.start(|| {}, app).map_err(|e| e.to_string())?;

    let seen = seen.lock().unwrap();
    ensure!(
        *seen == [("outer", 1), ("inner", 2)],
        "one-shots ran at {:?}",
        *seen
    );

    Ok(())
}

fn recurring_cancels_itself() -> Result<(), String> {
    let (_env, scheduler) = setup(Duration::from_micros(100));
    let runs = Arc::new(AtomicU32::new(0));
    let slot: Arc<Mutex<Option<RecurringHandle>>> = Arc::new(Mutex::new(None));

    struct App {
        runs: Arc<AtomicU32>,
        slot: Arc<Mutex<Option<RecurringHandle>>>,
        passes: u32,
    }

    impl Application for App {
        fn setup(&mut self, cx: &SchedulerHandle) {
            let (runs, slot, queue) = (self.runs.clone(), self.slot.clone(), cx.queue().clone());
            let handle = cx
                .queue()
                .enqueue_recurring(move || {
                    if runs.fetch_add(1, Ordering::SeqCst) + 1 == 5 {
                        if let Some(handle) = slot.lock().unwrap().as_ref() {
                            queue.cancel_recurring(handle);
                        }
                    }
                })
                .unwrap();
            *self.slot.lock().unwrap() = Some(handle);
        }

        fn run(&mut self, cx: &SchedulerHandle) {
            self.passes += 1;
            if self.passes == 8 {
                cx.stop();
            }
        }
    }

    let app = App {
        runs: runs.clone(),
        slot: slot.clone(),
        passes: 0,
    };
    scheduler.start(|| {}, app).map_err(|e| e.to_string())?;

    ensure!(
        runs.load(Ordering::SeqCst) == 5,
        "recurring callback ran {} times",
        runs.load(Ordering::SeqCst)
    );
    ensure!(
        slot.lock().unwrap().as_ref().is_some_and(|h| !h.is_active()),
        "handle still active"
    );
    ensure!(
        scheduler.queue().recurring_len() == 0,
        "cancelled entry was not removed"
    );

    Ok(())
}
