// CallButton — Dispatch Loop
//
// The coordinator: every gesture, link transition and config message funnels
// into this single loop (run on the main thread), which owns the recording
// session, the recorder and the persisted tunables. The recv timeout doubles
// as the recording-cap check cadence, so a held button cannot run past the
// max duration by more than one wake.

use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use esp_idf_svc::nvs::{EspNvs, NvsDefault};

use crate::audio::{AudioRecorder, CaptureSource};
use crate::config::{LiveTunables, Tunables, TunablesPatch, DISPATCH_WAKE_MS, MAIN_BUTTON};
use crate::events::{AppEvent, ChannelId, Gesture, GestureEvent, LedColor, LedCommand};
use crate::net;
use crate::protocol::{EventPublisher, Transport};
use crate::session::SessionCoordinator;

pub struct Dispatcher<T: Transport, S: CaptureSource + 'static> {
    publisher: Arc<Mutex<EventPublisher<T>>>,
    recorder: AudioRecorder<S>,
    session: SessionCoordinator,
    led: Sender<LedCommand>,
    tunables: Tunables,
    live: Arc<LiveTunables>,
    nvs: EspNvs<NvsDefault>,
}

impl<T: Transport, S: CaptureSource + 'static> Dispatcher<T, S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        publisher: Arc<Mutex<EventPublisher<T>>>,
        recorder: AudioRecorder<S>,
        led: Sender<LedCommand>,
        tunables: Tunables,
        live: Arc<LiveTunables>,
        nvs: EspNvs<NvsDefault>,
    ) -> Self {
        let session = SessionCoordinator::new(tunables.max_record_sec * 1000);
        Self {
            publisher,
            recorder,
            session,
            led,
            tunables,
            live,
            nvs,
        }
    }

    pub fn run(mut self, events: Receiver<AppEvent>) {
        log::info!("Dispatch loop running");

        loop {
            match events.recv_timeout(Duration::from_millis(DISPATCH_WAKE_MS)) {
                Ok(event) => self.handle(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    log::error!("All event senders gone — dispatch loop exiting");
                    return;
                }
            }

            if self.session.check_deadline(net::now_ms()).is_some() {
                log::info!("Recording reached the duration cap");
                self.finish_recording();
            }
        }
    }

    fn handle(&mut self, event: AppEvent) {
        match event {
            AppEvent::Gesture(gesture) => self.handle_gesture(gesture),
            AppEvent::LinkUp => self.handle_link_up(),
            AppEvent::LinkDown => {
                log::warn!("Broker link down");
                self.led(LedCommand::Flash(LedColor::Yellow, 300));
            }
            AppEvent::ConfigUpdate(body) => self.handle_config_update(&body),
        }
    }

    fn handle_gesture(&mut self, event: GestureEvent) {
        use Gesture::*;

        match (event.channel, event.gesture) {
            // Main button: long press starts a voice message, the release
            // that ends it both stops and sends. These two never go out as
            // press events.
            (ChannelId::Button(MAIN_BUTTON), Long) => self.start_recording(event.at_ms),
            (ChannelId::Button(MAIN_BUTTON), Single { after_long: true }) => {
                if self.session.on_release(event.at_ms).is_some() {
                    self.finish_recording();
                }
            }

            (channel, gesture) => {
                if let Some((button, press_type, color)) = press_route(channel, gesture) {
                    self.publish_press(button, press_type);
                    self.led(LedCommand::Flash(color, 200));
                }
            }
        }
    }

    fn start_recording(&mut self, at_ms: u32) {
        if !self.session.on_long_press(at_ms) {
            return;
        }

        match self.recorder.start() {
            Ok(()) => self.led(LedCommand::Solid(LedColor::Blue)),
            Err(e) => {
                log::error!("Recorder start failed: {e:?}");
                self.session.abort();
                self.led(LedCommand::Flash(LedColor::Red, 500));
            }
        }
    }

    fn finish_recording(&mut self) {
        self.led(LedCommand::Clear);

        // The clip borrows the recorder's encode buffer, so only disjoint
        // fields (publisher) are touched while it is alive; the LED feedback
        // happens after the borrow ends.
        let sent = match self.recorder.stop() {
            Ok(Some(clip)) => {
                let result = self.publisher.lock().unwrap().publish_voice(
                    clip.adpcm,
                    clip.duration_secs(),
                    clip.sample_rate,
                    net::wall_ms(),
                );
                match result {
                    Ok(()) => true,
                    Err(e) => {
                        log::warn!("Voice publish failed: {e}");
                        false
                    }
                }
            }
            Ok(None) => {
                log::warn!("No voice clip to send");
                false
            }
            Err(e) => {
                log::error!("Recorder stop failed: {e:?}");
                false
            }
        };

        if sent {
            self.led(LedCommand::Flash(LedColor::Green, 300));
        } else {
            self.led(LedCommand::Flash(LedColor::Red, 500));
        }
    }

    fn handle_link_up(&mut self) {
        log::info!("Broker link up");
        let stats = net::link_stats();

        {
            let mut publisher = self.publisher.lock().unwrap();
            if let Err(e) = publisher.transport_mut().on_link_up() {
                log::warn!("Link-up transport setup failed: {e}");
            }
            if let Err(e) = publisher.publish_registration(&stats) {
                log::warn!("Registration publish failed: {e}");
            }
            if let Err(e) = publisher.publish_config_status(&self.tunables) {
                log::warn!("Config status publish failed: {e}");
            }
        }

        self.led(LedCommand::Flash(LedColor::Green, 300));
    }

    fn handle_config_update(&mut self, body: &str) {
        match serde_json::from_str::<TunablesPatch>(body) {
            Ok(patch) => {
                if self.tunables.apply_patch(&patch) {
                    self.live.apply(&self.tunables);
                    if let Err(e) = self.tunables.save(&mut self.nvs) {
                        log::warn!("Persisting tunables failed: {e}");
                    }
                }
                if let Err(e) = self
                    .publisher
                    .lock()
                    .unwrap()
                    .publish_config_status(&self.tunables)
                {
                    log::warn!("Config status publish failed: {e}");
                }
                self.led(LedCommand::Flash(LedColor::Green, 300));
            }
            Err(e) => {
                log::warn!("Rejected config update: {e}");
                self.led(LedCommand::Flash(LedColor::Red, 300));
            }
        }
    }

    fn publish_press(&mut self, button: &str, press_type: &str) {
        let stats = net::link_stats();
        if let Err(e) =
            self.publisher
                .lock()
                .unwrap()
                .publish_press(button, press_type, &stats, net::wall_ms())
        {
            log::warn!("Press publish failed: {e}");
        }
    }

    fn led(&self, command: LedCommand) {
        if self.led.send(command).is_err() {
            log::warn!("LED task gone");
        }
    }
}

/// Wire mapping for gestures that go out as press events: button label,
/// `pressType` string, feedback color. Returns `None` for the main button's
/// recording-session gestures (handled by the session coordinator) and for
/// press-down edges, which are timing markers, not events.
fn press_route(
    channel: ChannelId,
    gesture: Gesture,
) -> Option<(&'static str, &'static str, LedColor)> {
    use Gesture::*;

    let (press_type, color) = match (channel, gesture) {
        (ChannelId::Button(MAIN_BUTTON), Long)
        | (ChannelId::Button(MAIN_BUTTON), Single { after_long: true }) => return None,
        // A held aux button reports "long" at the threshold and "single" on
        // release, the same pair the backend has always received.
        (ChannelId::Button(_), Single { .. }) => ("single", LedColor::White),
        (ChannelId::Button(_), Long) => ("long", LedColor::Cyan),
        (ChannelId::Touch, Touch) => ("single", LedColor::Cyan),
        (ChannelId::Touch, DoubleTouch) => ("double", LedColor::Purple),
        (ChannelId::Shake, Shake) => ("shake", LedColor::Red),
        _ => return None,
    };

    Some((channel.label(), press_type, color))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_aux_button_reports_long_then_single() {
        let (button, press_type, _) = press_route(ChannelId::Button(2), Gesture::Long).unwrap();
        assert_eq!((button, press_type), ("aux2", "long"));

        let (button, press_type, _) =
            press_route(ChannelId::Button(2), Gesture::Single { after_long: true }).unwrap();
        assert_eq!((button, press_type), ("aux2", "single"));
    }

    #[test]
    fn release_after_long_and_short_click_share_the_wire_string() {
        let tapped = press_route(ChannelId::Button(4), Gesture::Single { after_long: false });
        let released = press_route(ChannelId::Button(4), Gesture::Single { after_long: true });
        assert_eq!(tapped, released);
    }

    #[test]
    fn main_button_session_gestures_are_not_press_events() {
        assert_eq!(press_route(ChannelId::Button(0), Gesture::Long), None);
        assert_eq!(
            press_route(ChannelId::Button(0), Gesture::Single { after_long: true }),
            None
        );
        // A plain click on the main button still goes out.
        let (button, press_type, _) =
            press_route(ChannelId::Button(0), Gesture::Single { after_long: false }).unwrap();
        assert_eq!((button, press_type), ("main", "single"));
    }

    #[test]
    fn touch_and_shake_map_to_their_event_names() {
        let (button, press_type, _) = press_route(ChannelId::Touch, Gesture::Touch).unwrap();
        assert_eq!((button, press_type), ("touch", "single"));

        let (button, press_type, _) = press_route(ChannelId::Touch, Gesture::DoubleTouch).unwrap();
        assert_eq!((button, press_type), ("touch", "double"));

        let (button, press_type, _) = press_route(ChannelId::Shake, Gesture::Shake).unwrap();
        assert_eq!((button, press_type), ("shake", "shake"));
    }

    #[test]
    fn press_down_edges_are_never_published() {
        for channel in [ChannelId::Button(0), ChannelId::Button(3), ChannelId::Touch] {
            assert_eq!(press_route(channel, Gesture::PressDown), None);
        }
    }
}
