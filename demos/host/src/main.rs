use std::time::Duration;

use duet::{Level, SchedulerConfig, SchedulerHandle, TriggerMode};
use duet_host::{HostEnv, init_scheduler};
use duet_utils::delay::Delay;
use log::info;

const BUTTON: u8 = 0;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Started");

    let env = HostEnv::new();
    let scheduler = init_scheduler(
        &env,
        SchedulerConfig::default().with_tick_interval(Duration::from_millis(10)),
    )
    .unwrap();

    let bridge = env.bridge(scheduler.queue().clone());
    bridge
        .bind(BUTTON, TriggerMode::Rising, |event| {
            info!("Button pressed at {} us", event.micros());
        })
        .unwrap();

    let mut beats = 0;
    let heartbeat = scheduler
        .queue()
        .enqueue_recurring(move || {
            beats += 1;
            if beats % 10 == 0 {
                info!("heartbeat {}", beats);
            }
        })
        .unwrap();

    // The platform side plays a user pressing the button every half second
    let mut ticks = 0;
    let platform_tick = {
        let pins = env.pins.clone();
        move || {
            ticks += 1;
            match ticks % 50 {
                0 => {
                    pins.set_level(BUTTON, Level::High);
                }
                5 => {
                    pins.set_level(BUTTON, Level::Low);
                }
                _ => {}
            }
        }
    };

    let mut passes = 0;
    let app = move |cx: &SchedulerHandle| {
        let mut delay = Delay::new(cx.clone());
        passes += 1;
        if passes % 10 == 0 {
            info!("pass {}", passes);
        }
        delay.delay(Duration::from_millis(20));

        if passes == 60 {
            cx.queue().cancel_recurring(&heartbeat);
        }
        if passes == 100 {
            cx.stop();
        }
    };

    scheduler.start(platform_tick, app).unwrap();

    info!("Finished");
}
