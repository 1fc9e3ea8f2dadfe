// CallButton — Outbound Event & Telemetry Protocol
//
// Builds the JSON messages the backend expects and stamps them with a
// free-running per-device sequence number. Delivery is fire-and-forget: a
// publish while the transport is down fails and the event is dropped (no
// durable retry queue on this hardware; the transport's own reconnect logic
// is the only backoff).

use anyhow::{bail, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;

use crate::config::{self, Tunables, FIRMWARE_VERSION, HARDWARE_VERSION};

/// Delivery guarantee requested from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosLevel {
    AtMostOnce,
    AtLeastOnce,
}

/// Narrow transport contract: the publisher is agnostic to MQTT vs anything
/// else that can move a topic + payload.
pub trait Transport: Send {
    fn is_connected(&self) -> bool;
    fn publish(&mut self, topic: &str, qos: QosLevel, payload: &[u8]) -> Result<()>;

    /// Re-establish whatever transport state does not survive a reconnect
    /// (MQTT subscriptions, for one). Called on every link-up.
    fn on_link_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Static device identity baked into every message.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub mac: String,
    pub ip: String,
}

/// Point-in-time device health, gathered by the caller right before a
/// publish (the publisher itself never touches the radio).
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkStats {
    pub rssi: i32,
    pub battery_pct: u8,
    pub free_heap: u32,
    pub uptime_ms: u64,
}

pub struct EventPublisher<T: Transport> {
    transport: T,
    ident: DeviceIdentity,
    seq: u32,
    press_topic: String,
    voice_topic: String,
    config_status_topic: String,
}

impl<T: Transport> EventPublisher<T> {
    pub fn new(transport: T, ident: DeviceIdentity) -> Self {
        let press_topic = config::topic_press(&ident.device_id);
        let voice_topic = config::topic_voice(&ident.device_id);
        let config_status_topic = config::topic_config_status(&ident.device_id);
        Self {
            transport,
            ident,
            seq: 0,
            press_topic,
            voice_topic,
            config_status_topic,
        }
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Next sequence number. Incremented on every message build; a publish
    /// that fails after the build leaves a gap, matching the no-retry
    /// delivery semantics.
    fn next_seq(&mut self) -> u32 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    /// Publish a classified gesture as a press event.
    pub fn publish_press(
        &mut self,
        button: &str,
        press_type: &str,
        stats: &LinkStats,
        timestamp_ms: u64,
    ) -> Result<()> {
        if !self.transport.is_connected() {
            bail!("transport disconnected, press event dropped");
        }

        let payload = json!({
            "deviceId": self.ident.device_id,
            "button": button,
            "pressType": press_type,
            "battery": stats.battery_pct,
            "rssi": stats.rssi,
            "firmwareVersion": FIRMWARE_VERSION,
            "timestamp": timestamp_ms,
            "sequenceNumber": self.next_seq(),
        });

        let topic = self.press_topic.clone();
        self.transport
            .publish(&topic, QosLevel::AtLeastOnce, payload.to_string().as_bytes())?;
        log::info!("Published press event: {button}/{press_type}");
        Ok(())
    }

    /// Publish a finished voice recording, ADPCM audio inlined as base64.
    pub fn publish_voice(
        &mut self,
        adpcm: &[u8],
        duration_sec: f32,
        sample_rate: u32,
        timestamp_ms: u64,
    ) -> Result<()> {
        if !self.transport.is_connected() {
            bail!("transport disconnected, voice message dropped");
        }
        if adpcm.is_empty() {
            bail!("empty voice payload");
        }

        let payload = json!({
            "deviceId": self.ident.device_id,
            "button": "main",
            "pressType": "voice",
            "duration": duration_sec,
            "format": "adpcm",
            "sampleRate": sample_rate,
            "audioData": BASE64.encode(adpcm),
            "timestamp": timestamp_ms,
            "sequenceNumber": self.next_seq(),
        });

        let body = payload.to_string();
        log::info!(
            "Publishing voice message: {duration_sec:.2}s, {} bytes audio, {} bytes JSON",
            adpcm.len(),
            body.len()
        );

        let topic = self.voice_topic.clone();
        self.transport
            .publish(&topic, QosLevel::AtLeastOnce, body.as_bytes())
    }

    /// Periodic device-health heartbeat. Best effort (QoS 0).
    pub fn publish_heartbeat(&mut self, stats: &LinkStats, timestamp_ms: u64) -> Result<()> {
        if !self.transport.is_connected() {
            bail!("transport disconnected, heartbeat skipped");
        }

        let payload = json!({
            "deviceId": self.ident.device_id,
            "timestamp": timestamp_ms,
            "uptime": stats.uptime_ms,
            "rssi": stats.rssi,
            "battery": stats.battery_pct,
            "freeHeap": stats.free_heap,
            "firmwareVersion": FIRMWARE_VERSION,
            "ipAddress": self.ident.ip,
        });

        self.transport.publish(
            config::MQTT_TOPIC_HEARTBEAT,
            QosLevel::AtMostOnce,
            payload.to_string().as_bytes(),
        )
    }

    /// Announce the device on every (re)connect.
    pub fn publish_registration(&mut self, stats: &LinkStats) -> Result<()> {
        if !self.transport.is_connected() {
            bail!("transport disconnected, registration skipped");
        }

        let payload = json!({
            "deviceId": self.ident.device_id,
            "type": "smart_button",
            "firmwareVersion": FIRMWARE_VERSION,
            "hardwareVersion": HARDWARE_VERSION,
            "macAddress": self.ident.mac,
            "ipAddress": self.ident.ip,
            "rssi": stats.rssi,
            "capabilities": {
                "button": true,
                "led": true,
                "accelerometer": true,
                "voice": true,
            },
        });

        self.transport.publish(
            config::MQTT_TOPIC_REGISTER,
            QosLevel::AtLeastOnce,
            payload.to_string().as_bytes(),
        )?;
        log::info!("Published device registration");
        Ok(())
    }

    /// Report the active tunables, on connect and after config updates.
    pub fn publish_config_status(&mut self, t: &Tunables) -> Result<()> {
        if !self.transport.is_connected() {
            bail!("transport disconnected, config status skipped");
        }

        let payload = json!({
            "heartbeatInterval": t.heartbeat_sec,
            "ledBrightness": t.led_brightness,
            "shakeThreshold": t.shake_threshold_cg,
            "touchThreshold": t.touch_threshold_pct,
            "maxRecordingSeconds": t.max_record_sec,
        });

        let topic = self.config_status_topic.clone();
        self.transport
            .publish(&topic, QosLevel::AtLeastOnce, payload.to_string().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[derive(Default)]
    struct MockTransport {
        connected: bool,
        sent: Vec<(String, QosLevel, Vec<u8>)>,
    }

    impl Transport for MockTransport {
        fn is_connected(&self) -> bool {
            self.connected
        }

        fn publish(&mut self, topic: &str, qos: QosLevel, payload: &[u8]) -> Result<()> {
            self.sent.push((topic.to_string(), qos, payload.to_vec()));
            Ok(())
        }
    }

    fn publisher(connected: bool) -> EventPublisher<MockTransport> {
        EventPublisher::new(
            MockTransport {
                connected,
                ..Default::default()
            },
            DeviceIdentity {
                device_id: "btn-a1b2c3".into(),
                mac: "aa:bb:cc:a1:b2:c3".into(),
                ip: "10.10.0.42".into(),
            },
        )
    }

    fn body(publisher: &EventPublisher<MockTransport>, i: usize) -> Value {
        serde_json::from_slice(&publisher.transport.sent[i].2).unwrap()
    }

    #[test]
    fn press_event_shape_and_topic() {
        let mut p = publisher(true);
        let stats = LinkStats {
            rssi: -61,
            battery_pct: 100,
            ..Default::default()
        };
        p.publish_press("aux2", "single", &stats, 1_700_000_000_123).unwrap();

        let (topic, qos, _) = &p.transport.sent[0];
        assert_eq!(topic, "callbutton/button/btn-a1b2c3/press");
        assert_eq!(*qos, QosLevel::AtLeastOnce);

        let v = body(&p, 0);
        assert_eq!(v["deviceId"], "btn-a1b2c3");
        assert_eq!(v["button"], "aux2");
        assert_eq!(v["pressType"], "single");
        assert_eq!(v["rssi"], -61);
        assert_eq!(v["battery"], 100);
        assert_eq!(v["sequenceNumber"], 0);
        assert_eq!(v["timestamp"], 1_700_000_000_123u64);
    }

    #[test]
    fn sequence_numbers_strictly_increase_across_message_kinds() {
        let mut p = publisher(true);
        let stats = LinkStats::default();

        p.publish_press("main", "single", &stats, 1).unwrap();
        p.publish_voice(&[0x70, 0x07], 1.5, 16_000, 2).unwrap();
        p.publish_press("shake", "shake", &stats, 3).unwrap();

        let seqs: Vec<u64> = (0..3)
            .map(|i| body(&p, i)["sequenceNumber"].as_u64().unwrap())
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn disconnected_publish_fails_without_sending() {
        let mut p = publisher(false);
        let stats = LinkStats::default();

        assert!(p.publish_press("main", "single", &stats, 1).is_err());
        assert!(p.publish_heartbeat(&stats, 1).is_err());
        assert!(p.transport.sent.is_empty());

        // No sequence number was consumed by the early-out path.
        p.transport.connected = true;
        p.publish_press("main", "single", &stats, 2).unwrap();
        assert_eq!(body(&p, 0)["sequenceNumber"], 0);
    }

    #[test]
    fn voice_message_inlines_base64_adpcm() {
        let mut p = publisher(true);
        let audio = vec![0x12u8, 0x34, 0x56];
        p.publish_voice(&audio, 0.25, 16_000, 9).unwrap();

        let (topic, _, _) = &p.transport.sent[0];
        assert_eq!(topic, "callbutton/button/btn-a1b2c3/voice");

        let v = body(&p, 0);
        assert_eq!(v["format"], "adpcm");
        assert_eq!(v["sampleRate"], 16_000);
        assert_eq!(v["duration"], 0.25);
        let decoded = BASE64.decode(v["audioData"].as_str().unwrap()).unwrap();
        assert_eq!(decoded, audio);
    }

    #[test]
    fn heartbeat_uses_qos_zero_and_health_fields() {
        let mut p = publisher(true);
        let stats = LinkStats {
            rssi: -70,
            battery_pct: 100,
            free_heap: 123_456,
            uptime_ms: 42_000,
        };
        p.publish_heartbeat(&stats, 77).unwrap();

        let (topic, qos, _) = &p.transport.sent[0];
        assert_eq!(topic, config::MQTT_TOPIC_HEARTBEAT);
        assert_eq!(*qos, QosLevel::AtMostOnce);

        let v = body(&p, 0);
        assert_eq!(v["uptime"], 42_000);
        assert_eq!(v["freeHeap"], 123_456);
        assert_eq!(v["rssi"], -70);
    }

    #[test]
    fn empty_voice_payload_is_rejected() {
        let mut p = publisher(true);
        assert!(p.publish_voice(&[], 0.0, 16_000, 1).is_err());
        assert!(p.transport.sent.is_empty());
    }
}
