// CallButton — MQTT Transport
//
// Wraps the esp-idf MQTT client behind the `Transport` trait. Connection
// state is tracked through the client's event callback and mirrored into an
// atomic; link transitions and inbound config messages are forwarded to the
// dispatch loop as `AppEvent`s so all reactions happen on one thread. The
// client reconnects on its own, the firmware only observes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use anyhow::{Context, Result};
use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration, QoS};

use crate::config;
use crate::events::AppEvent;
use crate::protocol::{QosLevel, Transport};

pub struct MqttTransport {
    client: EspMqttClient<'static>,
    connected: Arc<AtomicBool>,
    config_set_topic: String,
}

impl MqttTransport {
    /// Connect to the broker. The callback runs on the MQTT client's own
    /// task, so it only flips the connection flag and forwards events.
    pub fn connect(device_id: &str, events: Sender<AppEvent>) -> Result<Self> {
        let connected = Arc::new(AtomicBool::new(false));
        let config_set_topic = config::topic_config_set(device_id);

        let conf = MqttClientConfiguration {
            client_id: Some(device_id),
            buffer_size: config::MQTT_BUFFER_SIZE,
            out_buffer_size: config::MQTT_BUFFER_SIZE,
            ..Default::default()
        };

        let flag = Arc::clone(&connected);
        let inbound_topic = config_set_topic.clone();
        let client = EspMqttClient::new_cb(config::MQTT_BROKER_URI, &conf, move |event| {
            match event.payload() {
                EventPayload::Connected(_) => {
                    log::info!("MQTT connected");
                    flag.store(true, Ordering::Release);
                    let _ = events.send(AppEvent::LinkUp);
                }
                EventPayload::Disconnected => {
                    log::warn!("MQTT disconnected");
                    flag.store(false, Ordering::Release);
                    let _ = events.send(AppEvent::LinkDown);
                }
                EventPayload::Received {
                    topic: Some(topic),
                    data,
                    ..
                } if topic == inbound_topic => match std::str::from_utf8(data) {
                    Ok(body) => {
                        let _ = events.send(AppEvent::ConfigUpdate(body.to_string()));
                    }
                    Err(_) => log::warn!("Dropping non-UTF8 config message"),
                },
                EventPayload::Error(e) => log::warn!("MQTT error: {e}"),
                _ => {}
            }
        })
        .context("creating MQTT client")?;

        log::info!("MQTT client started for {}", config::MQTT_BROKER_URI);
        Ok(Self {
            client,
            connected,
            config_set_topic,
        })
    }

    /// Subscribe to the inbound config topic. Called from the dispatch loop
    /// on every `LinkUp` since subscriptions do not survive a reconnect.
    pub fn subscribe_config(&mut self) -> Result<()> {
        let topic = self.config_set_topic.clone();
        self.client
            .subscribe(&topic, QoS::AtLeastOnce)
            .with_context(|| format!("subscribing to {topic}"))?;
        log::info!("Subscribed to {topic}");
        Ok(())
    }
}

impl Transport for MqttTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn on_link_up(&mut self) -> Result<()> {
        self.subscribe_config()
    }

    fn publish(&mut self, topic: &str, qos: QosLevel, payload: &[u8]) -> Result<()> {
        let qos = match qos {
            QosLevel::AtMostOnce => QoS::AtMostOnce,
            QosLevel::AtLeastOnce => QoS::AtLeastOnce,
        };
        // enqueue hands the message to the client task without blocking on
        // the network, safe to call from the dispatch loop.
        self.client
            .enqueue(topic, qos, false, payload)
            .with_context(|| format!("publishing to {topic}"))?;
        Ok(())
    }
}
