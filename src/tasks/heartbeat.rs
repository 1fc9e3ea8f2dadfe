// CallButton — Heartbeat Task
//
// Publishes the periodic device-health message. Sleeps in one-second steps
// and re-reads the interval from the live tunables each step, so a config
// update takes effect within a second instead of after the old interval.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::config::LiveTunables;
use crate::mqtt::MqttTransport;
use crate::net;
use crate::protocol::EventPublisher;

pub fn heartbeat_task(
    publisher: Arc<Mutex<EventPublisher<MqttTransport>>>,
    live: Arc<LiveTunables>,
) {
    log::info!("Heartbeat task started");

    loop {
        let mut elapsed_sec = 0u32;
        while elapsed_sec < live.heartbeat_sec.load(Ordering::Relaxed).max(1) {
            thread::sleep(Duration::from_secs(1));
            elapsed_sec += 1;
        }

        let stats = net::link_stats();
        let result = publisher
            .lock()
            .unwrap()
            .publish_heartbeat(&stats, net::wall_ms());
        match result {
            Ok(()) => log::debug!(
                "Heartbeat sent (rssi {}, heap {})",
                stats.rssi,
                stats.free_heap
            ),
            // Expected while the link is down; the broker reconnect is
            // handled elsewhere.
            Err(e) => log::debug!("Heartbeat skipped: {e}"),
        }
    }
}
