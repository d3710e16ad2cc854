// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test that yielding outside the user context aborts the process
//!
//! Each case re-executes this binary as a child and inspects how it died.

#[macro_use]
mod utils;

use std::{env, process::Command, process::ExitCode, thread, time::Duration};

use duet::SchedulerHandle;

use crate::utils::{Outcome, setup};

const CHILD_VAR: &str = "DUET_CHILD";

fn main() -> ExitCode {
    if let Ok(case) = env::var(CHILD_VAR) {
        child(&case);
        // Reaching this point means the misuse went unnoticed
        return ExitCode::SUCCESS;
    }

    let mut outcome = Outcome::default();
    for case in ["yield-from-platform-tick", "delay-from-foreign-thread", "suspend-before-start"] {
        outcome.check(case, || expect_abort(case));
    }
    outcome.exit_code()
}

fn child(case: &str) {
    let (_env, scheduler) = setup(Duration::from_micros(100));
    let handle = scheduler.handle();

    match case {
        "yield-from-platform-tick" => {
            let _ = scheduler.start(move || handle.yield_now(), |_: &SchedulerHandle| {});
        }
        "delay-from-foreign-thread" => {
            let app = |cx: &SchedulerHandle| {
                let cx = cx.clone();
                let _ = thread::spawn(move || cx.delay(Duration::from_millis(10))).join();
            };
            let _ = scheduler.start(|| {}, app);
        }
        "suspend-before-start" => handle.suspend(),
        _ => {}
    }
}

fn expect_abort(case: &str) -> Result<(), String> {
    let exe = env::current_exe().map_err(|e| e.to_string())?;
    let output = Command::new(exe)
        .env(CHILD_VAR, case)
        .env("RUST_LOG", "error")
        .output()
        .map_err(|e| e.to_string())?;

    ensure!(!output.status.success(), "child exited normally");

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        ensure!(
            output.status.signal() == Some(6),
            "child ended with {:?}, expected SIGABRT",
            output.status
        );
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    ensure!(
        stderr.contains("outside the user context"),
        "no diagnostic on stderr: {}",
        stderr
    );

    Ok(())
}
