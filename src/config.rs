// CallButton — Hardware & System Configuration
// Target: ESP32-S3 custom PCB (6 buttons, touch pad, LIS3DHTR, WS2812 ring,
// I2S microphone)

use std::sync::atomic::{AtomicU32, Ordering};

use esp_idf_svc::nvs::{EspNvs, NvsDefault};

// ---------------------------------------------------------------------------
// Firmware identity
// ---------------------------------------------------------------------------
pub const FIRMWARE_VERSION: &str = "v3.0-rs";
pub const HARDWARE_VERSION: &str = "ESP32-S3 Custom PCB v1.0";
pub const DEVICE_ID_PREFIX: &str = "btn";

// ---------------------------------------------------------------------------
// I2C
// ---------------------------------------------------------------------------
pub const I2C_ADDR_MCP23017: u8 = 0x20;
pub const I2C_ADDR_LIS3DHTR: u8 = 0x19;
pub const I2C_TIMEOUT_TICKS: u32 = 1000; // FreeRTOS ticks

// ---------------------------------------------------------------------------
// Buttons (wired to the MCP23017 GPA bank)
// ---------------------------------------------------------------------------
pub const BUTTON_COUNT: usize = 6;

/// Expander pin for each button T1–T6.
pub const BUTTON_PINS: [u8; BUTTON_COUNT] = [7, 6, 5, 4, 3, 0];

/// Wire-protocol labels. T1 is the main (voice) button.
pub const BUTTON_LABELS: [&str; BUTTON_COUNT] = ["main", "aux1", "aux2", "aux3", "aux4", "aux5"];

/// T6 is wired active HIGH; every other button idles HIGH through a pull-up.
pub const BUTTON_INVERTED: [bool; BUTTON_COUNT] = [false, false, false, false, false, true];

pub const MAIN_BUTTON: usize = 0;

// ---------------------------------------------------------------------------
// Timing (milliseconds)
// ---------------------------------------------------------------------------
pub const INPUT_POLL_INTERVAL_MS: u64 = 10; // 100 Hz button/touch poll
pub const ACCEL_POLL_INTERVAL_MS: u64 = 20; // 50 Hz accelerometer
pub const LED_POLL_INTERVAL_MS: u64 = 20;
pub const DISPATCH_WAKE_MS: u64 = 50; // max-duration cap check cadence

pub const DEBOUNCE_MS: u32 = 50;
pub const LONG_PRESS_MS: u32 = 700;
// Button double-click detection was dropped in the final hardware revision:
// a short press is reported immediately on release. Only the touch pad keeps
// a real double-tap window.
pub const DOUBLE_TOUCH_WINDOW_MS: u32 = 500;

pub const SHAKE_THRESHOLD_CG: u32 = 800; // centi-g, i.e. 8.0 g
pub const SHAKE_COOLDOWN_MS: u32 = 2000;

pub const HEARTBEAT_INTERVAL_SEC: u32 = 30;

// ---------------------------------------------------------------------------
// Touch pad
// ---------------------------------------------------------------------------
pub const TOUCH_PAD_NUM: u32 = 1; // GPIO1 on the S3
pub const TOUCH_THRESHOLD_PCT: u32 = 80; // % of the calibration baseline
pub const TOUCH_CALIBRATION_SAMPLES: u32 = 10;

// ---------------------------------------------------------------------------
// LED ring (WS2812 via RMT)
// ---------------------------------------------------------------------------
pub const LED_COUNT: usize = 16;
pub const LED_BRIGHTNESS: u8 = 200;

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------
pub const AUDIO_SAMPLE_RATE: u32 = 16_000; // 16 kHz mono
pub const AUDIO_MAX_DURATION_SEC: u32 = 20;
pub const AUDIO_CHUNK_SAMPLES: usize = 1024; // per I2S read

// ---------------------------------------------------------------------------
// MQTT
// ---------------------------------------------------------------------------
pub const MQTT_BROKER_URI: &str = "mqtt://10.10.0.10:1883";
pub const MQTT_BUFFER_SIZE: usize = 4096;

pub const MQTT_TOPIC_REGISTER: &str = "callbutton/device/register";
pub const MQTT_TOPIC_HEARTBEAT: &str = "callbutton/device/heartbeat";

pub fn topic_press(device_id: &str) -> String {
    format!("callbutton/button/{device_id}/press")
}

pub fn topic_voice(device_id: &str) -> String {
    format!("callbutton/button/{device_id}/voice")
}

pub fn topic_config_status(device_id: &str) -> String {
    format!("callbutton/button/{device_id}/config/status")
}

pub fn topic_config_set(device_id: &str) -> String {
    format!("callbutton/button/{device_id}/config/set")
}

// ---------------------------------------------------------------------------
// WiFi (defaults; NVS provisioning overrides them)
// ---------------------------------------------------------------------------
pub const WIFI_SSID: &str = "CallButton";
pub const WIFI_PASSWORD: &str = "changeme-on-site";

// ---------------------------------------------------------------------------
// Task Stack Sizes (bytes)
// ---------------------------------------------------------------------------
pub const STACK_INPUT: usize = 4096;
pub const STACK_ACCEL: usize = 3072;
pub const STACK_LED: usize = 3072;
pub const STACK_AUDIO: usize = 8192;
pub const STACK_HEARTBEAT: usize = 6144;

// ---------------------------------------------------------------------------
// NVS keys
// ---------------------------------------------------------------------------
pub const NVS_NAMESPACE: &str = "callbtn";
const NVS_KEY_HEARTBEAT: &str = "hb_sec";
const NVS_KEY_LED_BRIGHT: &str = "led_bright";
const NVS_KEY_SHAKE_CG: &str = "shake_cg";
const NVS_KEY_TOUCH_PCT: &str = "touch_pct";
const NVS_KEY_MAX_RECORD: &str = "max_rec_sec";

// ---------------------------------------------------------------------------
// Runtime tunables
// ---------------------------------------------------------------------------

/// Tunables loaded once at boot. Tasks copy what they need at start; the hot
/// poll loops never touch NVS.
#[derive(Debug, Clone, Copy)]
pub struct Tunables {
    pub debounce_ms: u32,
    pub long_press_ms: u32,
    pub double_touch_window_ms: u32,
    pub shake_threshold_cg: u32,
    pub shake_cooldown_ms: u32,
    pub touch_threshold_pct: u32,
    pub max_record_sec: u32,
    pub heartbeat_sec: u32,
    pub led_brightness: u8,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            debounce_ms: DEBOUNCE_MS,
            long_press_ms: LONG_PRESS_MS,
            double_touch_window_ms: DOUBLE_TOUCH_WINDOW_MS,
            shake_threshold_cg: SHAKE_THRESHOLD_CG,
            shake_cooldown_ms: SHAKE_COOLDOWN_MS,
            touch_threshold_pct: TOUCH_THRESHOLD_PCT,
            max_record_sec: AUDIO_MAX_DURATION_SEC,
            heartbeat_sec: HEARTBEAT_INTERVAL_SEC,
            led_brightness: LED_BRIGHTNESS,
        }
    }
}

impl Tunables {
    /// Load persisted tunables, falling back to the compiled defaults for
    /// anything missing or out of range.
    pub fn load(nvs: &EspNvs<NvsDefault>) -> Self {
        let mut t = Self::default();

        if let Ok(Some(v)) = nvs.get_u32(NVS_KEY_HEARTBEAT) {
            if (5..=300).contains(&v) {
                t.heartbeat_sec = v;
            }
        }
        if let Ok(Some(v)) = nvs.get_u8(NVS_KEY_LED_BRIGHT) {
            t.led_brightness = v;
        }
        if let Ok(Some(v)) = nvs.get_u32(NVS_KEY_SHAKE_CG) {
            if (100..=1600).contains(&v) {
                t.shake_threshold_cg = v;
            }
        }
        if let Ok(Some(v)) = nvs.get_u32(NVS_KEY_TOUCH_PCT) {
            if (50..=95).contains(&v) {
                t.touch_threshold_pct = v;
            }
        }
        if let Ok(Some(v)) = nvs.get_u32(NVS_KEY_MAX_RECORD) {
            if (1..=AUDIO_MAX_DURATION_SEC).contains(&v) {
                t.max_record_sec = v;
            }
        }

        log::info!(
            "Tunables: heartbeat {}s, shake {:.2}g, touch {}%, max record {}s",
            t.heartbeat_sec,
            t.shake_threshold_cg as f32 / 100.0,
            t.touch_threshold_pct,
            t.max_record_sec
        );
        t
    }

    pub fn save(&self, nvs: &mut EspNvs<NvsDefault>) -> anyhow::Result<()> {
        nvs.set_u32(NVS_KEY_HEARTBEAT, self.heartbeat_sec)?;
        nvs.set_u8(NVS_KEY_LED_BRIGHT, self.led_brightness)?;
        nvs.set_u32(NVS_KEY_SHAKE_CG, self.shake_threshold_cg)?;
        nvs.set_u32(NVS_KEY_TOUCH_PCT, self.touch_threshold_pct)?;
        nvs.set_u32(NVS_KEY_MAX_RECORD, self.max_record_sec)?;
        log::info!("Tunables saved to NVS");
        Ok(())
    }
}

/// Partial tunable update received over MQTT (`config/set`). Absent fields
/// leave the current value alone; out-of-range fields are rejected whole.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TunablesPatch {
    pub heartbeat_interval: Option<u32>,
    pub led_brightness: Option<u8>,
    /// Shake threshold in g.
    pub shake_threshold: Option<f32>,
    pub touch_threshold: Option<u32>,
    pub max_recording_seconds: Option<u32>,
}

impl Tunables {
    /// Apply a patch, enforcing the same ranges as [`Tunables::load`].
    /// Returns `true` when anything changed.
    pub fn apply_patch(&mut self, p: &TunablesPatch) -> bool {
        let mut changed = false;

        if let Some(v) = p.heartbeat_interval {
            if (5..=300).contains(&v) && v != self.heartbeat_sec {
                self.heartbeat_sec = v;
                changed = true;
            }
        }
        if let Some(v) = p.led_brightness {
            if v != self.led_brightness {
                self.led_brightness = v;
                changed = true;
            }
        }
        if let Some(g) = p.shake_threshold {
            let cg = (g * 100.0) as u32;
            if (100..=1600).contains(&cg) && cg != self.shake_threshold_cg {
                self.shake_threshold_cg = cg;
                changed = true;
            }
        }
        if let Some(v) = p.touch_threshold {
            if (50..=95).contains(&v) && v != self.touch_threshold_pct {
                self.touch_threshold_pct = v;
                changed = true;
            }
        }
        if let Some(v) = p.max_recording_seconds {
            if (1..=AUDIO_MAX_DURATION_SEC).contains(&v) && v != self.max_record_sec {
                self.max_record_sec = v;
                changed = true;
            }
        }

        changed
    }
}

/// The subset of tunables that applies live, shared with the running tasks
/// as atomics so a config update never interrupts a poll loop.
pub struct LiveTunables {
    pub heartbeat_sec: AtomicU32,
    pub shake_threshold_cg: AtomicU32,
    pub led_brightness: AtomicU32,
}

impl LiveTunables {
    pub fn new(t: &Tunables) -> Self {
        Self {
            heartbeat_sec: AtomicU32::new(t.heartbeat_sec),
            shake_threshold_cg: AtomicU32::new(t.shake_threshold_cg),
            led_brightness: AtomicU32::new(t.led_brightness as u32),
        }
    }

    pub fn apply(&self, t: &Tunables) {
        self.heartbeat_sec.store(t.heartbeat_sec, Ordering::Relaxed);
        self.shake_threshold_cg
            .store(t.shake_threshold_cg, Ordering::Relaxed);
        self.led_brightness
            .store(t.led_brightness as u32, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_applies_only_present_fields() {
        let mut t = Tunables::default();
        let p: TunablesPatch =
            serde_json::from_str(r#"{"heartbeatInterval": 60, "ledBrightness": 50}"#).unwrap();

        assert!(t.apply_patch(&p));
        assert_eq!(t.heartbeat_sec, 60);
        assert_eq!(t.led_brightness, 50);
        assert_eq!(t.shake_threshold_cg, SHAKE_THRESHOLD_CG);
        assert_eq!(t.max_record_sec, AUDIO_MAX_DURATION_SEC);
    }

    #[test]
    fn patch_rejects_out_of_range_values() {
        let mut t = Tunables::default();
        let p: TunablesPatch = serde_json::from_str(
            r#"{"heartbeatInterval": 2, "shakeThreshold": 99.0, "maxRecordingSeconds": 3600}"#,
        )
        .unwrap();

        assert!(!t.apply_patch(&p));
        assert_eq!(t.heartbeat_sec, HEARTBEAT_INTERVAL_SEC);
        assert_eq!(t.shake_threshold_cg, SHAKE_THRESHOLD_CG);
    }

    #[test]
    fn patch_converts_shake_threshold_to_centi_g() {
        let mut t = Tunables::default();
        let p: TunablesPatch = serde_json::from_str(r#"{"shakeThreshold": 5.5}"#).unwrap();

        assert!(t.apply_patch(&p));
        assert_eq!(t.shake_threshold_cg, 550);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let p: Result<TunablesPatch, _> =
            serde_json::from_str(r#"{"bogus": true, "heartbeatInterval": 45}"#);
        assert_eq!(p.unwrap().heartbeat_interval, Some(45));
    }
}
