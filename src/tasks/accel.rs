// CallButton — Accelerometer Task
//
// Samples the LIS3DHTR at 50 Hz and feeds vector magnitudes into the shake
// detector. The threshold is re-read from the live tunables every tick so a
// config update lands without restarting the task.

use std::sync::atomic::Ordering;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::*;
use crate::drivers::accel::Lis3dhtr;
use crate::drivers::SharedBus;
use crate::events::{AppEvent, ChannelId, Gesture, GestureEvent};
use crate::input::ShakeDetector;
use crate::net;

pub fn accel_task(bus: SharedBus, live: Arc<LiveTunables>, events: Sender<AppEvent>) {
    log::info!("Accelerometer task started");

    let accel = Lis3dhtr::new(bus);
    if let Err(e) = accel.init() {
        log::error!("LIS3DHTR init failed in accel task: {e}");
        return;
    }

    let threshold_g = live.shake_threshold_cg.load(Ordering::Relaxed) as f32 / 100.0;
    let mut detector = ShakeDetector::new(threshold_g, SHAKE_COOLDOWN_MS);

    let interval = Duration::from_millis(ACCEL_POLL_INTERVAL_MS);

    loop {
        let tick_start = Instant::now();

        detector.set_threshold(live.shake_threshold_cg.load(Ordering::Relaxed) as f32 / 100.0);

        match accel.magnitude() {
            Ok(magnitude) => {
                let now = net::now_ms();
                if detector.sample(magnitude, now) {
                    log::info!("Shake detected: {magnitude:.2}g");
                    let event = GestureEvent {
                        channel: ChannelId::Shake,
                        gesture: Gesture::Shake,
                        at_ms: now,
                    };
                    if events.send(AppEvent::Gesture(event)).is_err() {
                        log::warn!("Dispatch channel closed — exiting accel task");
                        return;
                    }
                }
            }
            Err(e) => log::warn!("Accelerometer read error: {e}"),
        }

        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }
}
