use std::{process::ExitCode, time::Duration};

use duet::{Scheduler, SchedulerConfig};
use duet_host::{HostEnv, init_scheduler};

pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .try_init();
}

/// Host environment plus a scheduler sleeping `tick_interval` between ticks.
pub fn setup(tick_interval: Duration) -> (HostEnv, Scheduler) {
    init_logger();
    let env = HostEnv::new();
    let scheduler = init_scheduler(
        &env,
        SchedulerConfig::default().with_tick_interval(tick_interval),
    )
    .expect("Scheduler already initialized");
    (env, scheduler)
}

/// Collects scenario results. Scenarios run one after another because a
/// scheduler is single-instance.
#[derive(Default)]
pub struct Outcome {
    failed: usize,
}

impl Outcome {
    pub fn check<F: FnOnce() -> Result<(), String>>(&mut self, name: &str, scenario: F) {
        match scenario() {
            Ok(()) => println!("{} ... ok", name),
            Err(reason) => {
                println!("{} ... FAILED: {}", name, reason);
                self.failed += 1;
            }
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.failed == 0 {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

/// Turns a failed condition into a scenario error.
macro_rules! ensure {
    ( $cond:expr, $( $arg:tt )+ ) => {
        if !$cond {
            return Err(format!($( $arg )+));
        }
    };
}
