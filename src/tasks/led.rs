// CallButton — LED Task
//
// Sole owner of the WS2812 ring. Consumes `LedCommand`s and layers a timed
// flash over a persistent background color, so a white press-flash during a
// recording falls back to solid blue when it expires. Refreshes only on a
// visible change: the RMT transmit is blocking and every refresh rewrites
// the whole ring.

use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::*;
use crate::drivers::leds::LedRing;
use crate::events::{LedColor, LedCommand};

pub fn led_task(mut ring: LedRing, live: Arc<LiveTunables>, commands: Receiver<LedCommand>) {
    log::info!("LED task started");

    let mut background: Option<LedColor> = None;
    let mut flash: Option<(LedColor, Instant)> = None;
    let mut shown: Option<(Option<LedColor>, u8)> = None;

    if let Err(e) = ring.clear() {
        log::warn!("LED clear failed: {e}");
    }

    loop {
        match commands.recv_timeout(Duration::from_millis(LED_POLL_INTERVAL_MS)) {
            Ok(LedCommand::Flash(color, duration_ms)) => {
                flash = Some((
                    color,
                    Instant::now() + Duration::from_millis(duration_ms as u64),
                ));
            }
            Ok(LedCommand::Solid(color)) => background = Some(color),
            Ok(LedCommand::Clear) => background = None,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                log::warn!("LED channel closed — exiting LED task");
                let _ = ring.clear();
                return;
            }
        }

        if let Some((_, until)) = flash {
            if Instant::now() >= until {
                flash = None;
            }
        }

        let want = flash.map(|(c, _)| c).or(background);
        let brightness = live.led_brightness.load(Ordering::Relaxed) as u8;

        if shown != Some((want, brightness)) {
            let result = match want {
                Some(color) => ring.set_all(color.rgb(), brightness),
                None => ring.clear(),
            };
            match result {
                Ok(()) => shown = Some((want, brightness)),
                Err(e) => log::warn!("LED refresh failed: {e}"),
            }
        }
    }
}
