// CallButton — Input Task
//
// Polls the expander button bank and the touch pad at 100 Hz, runs the
// debounce/gesture classifiers and pushes gesture events to the dispatch
// loop. One I2C transaction per tick covers all six buttons.

use std::sync::mpsc::Sender;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::*;
use crate::drivers::expander::{decode_bank, Mcp23017};
use crate::drivers::touchpad::TouchPad;
use crate::drivers::SharedBus;
use crate::events::{AppEvent, ChannelId, GestureEvent};
use crate::input::{ButtonChannel, TouchChannel};
use crate::net;

pub fn input_task(
    bus: SharedBus,
    touch: Option<TouchPad>,
    tunables: Tunables,
    events: Sender<AppEvent>,
) {
    log::info!("Input task started");

    let expander = Mcp23017::new(bus);
    if let Err(e) = expander.init() {
        log::error!("MCP23017 init failed in input task: {e}");
        return;
    }

    let mut buttons: [ButtonChannel; BUTTON_COUNT] =
        core::array::from_fn(|_| ButtonChannel::new(tunables.debounce_ms, tunables.long_press_ms));
    let mut touch_chan =
        TouchChannel::new(tunables.debounce_ms, tunables.double_touch_window_ms);

    let interval = Duration::from_millis(INPUT_POLL_INTERVAL_MS);

    loop {
        let tick_start = Instant::now();
        let now = net::now_ms();

        match expander.read_bank() {
            Ok(bank) => {
                let pressed = decode_bank(bank);
                for (i, btn) in buttons.iter_mut().enumerate() {
                    if let Some(gesture) = btn.poll(pressed[i], now) {
                        let event = GestureEvent {
                            channel: ChannelId::Button(i),
                            gesture,
                            at_ms: now,
                        };
                        if events.send(AppEvent::Gesture(event)).is_err() {
                            log::warn!("Dispatch channel closed — exiting input task");
                            return;
                        }
                    }
                }
            }
            Err(e) => log::warn!("Button bank read error: {e}"),
        }

        if let Some(touch) = &touch {
            match touch.is_touched() {
                Ok(raw) => {
                    if let Some(gesture) = touch_chan.poll(raw, now) {
                        let event = GestureEvent {
                            channel: ChannelId::Touch,
                            gesture,
                            at_ms: now,
                        };
                        if events.send(AppEvent::Gesture(event)).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => log::warn!("Touch read error: {e}"),
            }
        }

        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }
}
