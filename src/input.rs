// CallButton — Input Debouncing & Gesture Classification
//
// Pure signal conditioning and per-channel state machines, polled at a fixed
// tick (10 ms) by the input task. Timestamps come in as wrapping millisecond
// counters so the whole module runs without hardware or a clock.

use crate::events::Gesture;

// ---------------------------------------------------------------------------
// Debounce filter
// ---------------------------------------------------------------------------

/// Commits a raw boolean reading as the stable logical state once it has
/// held steady for the configured window.
#[derive(Debug)]
pub struct Debouncer {
    stable: bool,
    last_raw: bool,
    last_change_ms: u32,
    window_ms: u32,
}

impl Debouncer {
    pub fn new(window_ms: u32) -> Self {
        Self {
            stable: false,
            last_raw: false,
            last_change_ms: 0,
            window_ms,
        }
    }

    pub fn stable(&self) -> bool {
        self.stable
    }

    /// Feed one raw reading. Returns `Some(new_state)` when the debounced
    /// state commits a transition, `None` otherwise.
    pub fn update(&mut self, raw: bool, now_ms: u32) -> Option<bool> {
        if raw != self.last_raw {
            self.last_change_ms = now_ms;
            self.last_raw = raw;
        }

        if now_ms.wrapping_sub(self.last_change_ms) >= self.window_ms && raw != self.stable {
            self.stable = raw;
            return Some(raw);
        }

        None
    }
}

// ---------------------------------------------------------------------------
// Button channel: Idle / Pressed / (LongSignaled)
// ---------------------------------------------------------------------------

/// Per-button classifier. Emits `PressDown` on the debounced press edge,
/// `Long` exactly once while the press is sustained, and `Single` on
/// release (tagged `after_long` when a `Long` already fired).
#[derive(Debug)]
pub struct ButtonChannel {
    debounce: Debouncer,
    press_start_ms: u32,
    long_sent: bool,
    long_press_ms: u32,
}

impl ButtonChannel {
    pub fn new(debounce_ms: u32, long_press_ms: u32) -> Self {
        Self {
            debounce: Debouncer::new(debounce_ms),
            press_start_ms: 0,
            long_sent: false,
            long_press_ms,
        }
    }

    /// One poll tick. At most one gesture per tick.
    pub fn poll(&mut self, raw: bool, now_ms: u32) -> Option<Gesture> {
        if let Some(pressed) = self.debounce.update(raw, now_ms) {
            return if pressed {
                self.press_start_ms = now_ms;
                self.long_sent = false;
                Some(Gesture::PressDown)
            } else {
                Some(Gesture::Single {
                    after_long: self.long_sent,
                })
            };
        }

        // Long press fires while the button is still held, once per press.
        if self.debounce.stable()
            && !self.long_sent
            && now_ms.wrapping_sub(self.press_start_ms) >= self.long_press_ms
        {
            self.long_sent = true;
            return Some(Gesture::Long);
        }

        None
    }
}

// ---------------------------------------------------------------------------
// Touch channel: debounce + double-tap window
// ---------------------------------------------------------------------------

/// Touch pad classifier. A second release within the window produces
/// `DoubleTouch`; otherwise `Touch` fires once the window expires.
#[derive(Debug)]
pub struct TouchChannel {
    debounce: Debouncer,
    release_ms: u32,
    waiting_for_double: bool,
    window_ms: u32,
}

impl TouchChannel {
    pub fn new(debounce_ms: u32, window_ms: u32) -> Self {
        Self {
            debounce: Debouncer::new(debounce_ms),
            release_ms: 0,
            waiting_for_double: false,
            window_ms,
        }
    }

    pub fn poll(&mut self, raw: bool, now_ms: u32) -> Option<Gesture> {
        if let Some(touched) = self.debounce.update(raw, now_ms) {
            if !touched {
                if self.waiting_for_double {
                    self.waiting_for_double = false;
                    return Some(Gesture::DoubleTouch);
                }
                self.waiting_for_double = true;
                self.release_ms = now_ms;
            }
            return None;
        }

        if self.waiting_for_double
            && !self.debounce.stable()
            && now_ms.wrapping_sub(self.release_ms) >= self.window_ms
        {
            self.waiting_for_double = false;
            return Some(Gesture::Touch);
        }

        None
    }
}

// ---------------------------------------------------------------------------
// Shake detector: magnitude threshold + cooldown, no debounce state machine
// ---------------------------------------------------------------------------
#[derive(Debug)]
pub struct ShakeDetector {
    threshold_g: f32,
    cooldown_ms: u32,
    last_shake_ms: Option<u32>,
}

impl ShakeDetector {
    pub fn new(threshold_g: f32, cooldown_ms: u32) -> Self {
        Self {
            threshold_g,
            cooldown_ms,
            last_shake_ms: None,
        }
    }

    pub fn set_threshold(&mut self, threshold_g: f32) {
        self.threshold_g = threshold_g;
    }

    /// Feed one magnitude sample (in g). Returns `true` when a shake event
    /// should fire.
    pub fn sample(&mut self, magnitude_g: f32, now_ms: u32) -> bool {
        if magnitude_g <= self.threshold_g {
            return false;
        }

        match self.last_shake_ms {
            Some(last) if now_ms.wrapping_sub(last) <= self.cooldown_ms => false,
            _ => {
                self.last_shake_ms = Some(now_ms);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: u32 = 10;
    const DEBOUNCE: u32 = 50;
    const LONG: u32 = 700;
    const WINDOW: u32 = 500;

    /// Run a button through a raw-level sequence, one tick per entry.
    fn drive(btn: &mut ButtonChannel, levels: &[bool], start_tick: u32) -> Vec<(u32, Gesture)> {
        let mut out = Vec::new();
        for (i, &raw) in levels.iter().enumerate() {
            let tick = start_tick + i as u32;
            if let Some(g) = btn.poll(raw, tick * TICK) {
                out.push((tick, g));
            }
        }
        out
    }

    #[test]
    fn debounce_suppresses_sub_window_jitter() {
        let mut d = Debouncer::new(DEBOUNCE);

        // Settle into released.
        for t in 0..10 {
            d.update(false, t * TICK);
        }
        assert!(!d.stable());

        // 4 ticks of noise (< 50 ms) then back to quiet: no commit.
        let noise = [true, false, true, false];
        let mut commits = 0;
        for (i, &raw) in noise.iter().enumerate() {
            if d.update(raw, (10 + i as u32) * TICK).is_some() {
                commits += 1;
            }
        }
        for t in 14..20 {
            if d.update(false, t * TICK).is_some() {
                commits += 1;
            }
        }
        assert_eq!(commits, 0);
        assert!(!d.stable());
    }

    #[test]
    fn long_press_fires_exactly_once() {
        let mut btn = ButtonChannel::new(DEBOUNCE, LONG);

        // Held for 2000 ms.
        let levels: Vec<bool> = std::iter::repeat(true).take(200).collect();
        let events = drive(&mut btn, &levels, 0);

        let longs = events
            .iter()
            .filter(|(_, g)| matches!(g, Gesture::Long))
            .count();
        assert_eq!(longs, 1);
    }

    #[test]
    fn main_button_hold_scenario() {
        // Spec scenario: held active for 800 ticks (8000 ms), then released.
        let mut btn = ButtonChannel::new(DEBOUNCE, LONG);

        let mut levels = vec![true; 800];
        levels.extend(std::iter::repeat(false).take(20));
        let events = drive(&mut btn, &levels, 0);

        assert_eq!(events.len(), 3);

        let (t0, g0) = events[0];
        assert_eq!(g0, Gesture::PressDown);
        assert_eq!(t0, 5); // after the 50 ms debounce window

        let (t1, g1) = events[1];
        assert_eq!(g1, Gesture::Long);
        assert_eq!(t1, 75); // press-start (tick 5) + 700 ms

        let (t2, g2) = events[2];
        assert_eq!(g2, Gesture::Single { after_long: true });
        assert!((800..=810).contains(&t2));
    }

    #[test]
    fn short_click_reports_single_without_long() {
        let mut btn = ButtonChannel::new(DEBOUNCE, LONG);

        let mut levels = vec![true; 20]; // 200 ms hold
        levels.extend(std::iter::repeat(false).take(20));
        let events = drive(&mut btn, &levels, 0);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].1, Gesture::PressDown);
        assert_eq!(events[1].1, Gesture::Single { after_long: false });
    }

    #[test]
    fn touch_double_tap_within_window() {
        // Two releases 200 ms apart: exactly one DoubleTouch, zero Touch.
        let mut touch = TouchChannel::new(DEBOUNCE, WINDOW);
        let mut events = Vec::new();

        let mut levels = Vec::new();
        levels.extend(std::iter::repeat(true).take(15)); // first tap
        levels.extend(std::iter::repeat(false).take(20)); // 200 ms gap
        levels.extend(std::iter::repeat(true).take(15)); // second tap
        levels.extend(std::iter::repeat(false).take(100)); // quiet

        for (i, &raw) in levels.iter().enumerate() {
            if let Some(g) = touch.poll(raw, i as u32 * TICK) {
                events.push(g);
            }
        }

        assert_eq!(events, vec![Gesture::DoubleTouch]);
    }

    #[test]
    fn lone_touch_fires_after_window_expires() {
        let mut touch = TouchChannel::new(DEBOUNCE, WINDOW);
        let mut events = Vec::new();

        let mut levels = Vec::new();
        levels.extend(std::iter::repeat(true).take(15));
        levels.extend(std::iter::repeat(false).take(80));

        for (i, &raw) in levels.iter().enumerate() {
            if let Some(g) = touch.poll(raw, i as u32 * TICK) {
                events.push(g);
            }
        }

        assert_eq!(events, vec![Gesture::Touch]);
    }

    #[test]
    fn shake_cooldown_suppresses_second_spike() {
        // Spec scenario: [1, 1, 9, 1, 9] g at consecutive 10 ms ticks.
        let mut det = ShakeDetector::new(8.0, 2000);
        let magnitudes = [1.0, 1.0, 9.0, 1.0, 9.0];

        let fired: Vec<bool> = magnitudes
            .iter()
            .enumerate()
            .map(|(i, &m)| det.sample(m, i as u32 * TICK))
            .collect();

        assert_eq!(fired, vec![false, false, true, false, false]);
    }

    #[test]
    fn shake_fires_again_after_cooldown() {
        let mut det = ShakeDetector::new(8.0, 2000);
        assert!(det.sample(9.0, 0));
        assert!(!det.sample(9.0, 1000));
        assert!(det.sample(9.0, 2010));
    }
}
