// CallButton — Firmware Entry Point
//
// Boot sequence:
//   1. Load persisted tunables from NVS.
//   2. Bring up the shared I2C bus; self-test the expander and accelerometer.
//   3. Calibrate the touch pad (nobody is touching a device that just
//      powered on).
//   4. Connect WiFi and start the MQTT client.
//   5. Spawn input, accelerometer, LED and heartbeat tasks.
//   6. Run the dispatch loop on the main thread.
//
// A dead GPIO expander means no buttons at all, so that failure parks the
// device in a red-flashing degraded loop. Everything else (accelerometer,
// touch, WiFi) degrades feature-by-feature and the device keeps serving
// button presses.

mod adpcm;
mod audio;
mod config;
mod drivers;
mod events;
mod input;
mod mqtt;
mod net;
mod protocol;
mod session;
mod tasks;

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::prelude::*;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs};

use crate::audio::AudioRecorder;
use crate::config::*;
use crate::drivers::accel::Lis3dhtr;
use crate::drivers::expander::Mcp23017;
use crate::drivers::leds::LedRing;
use crate::drivers::mic::I2sMic;
use crate::drivers::touchpad::TouchPad;
use crate::events::LedColor;
use crate::mqtt::MqttTransport;
use crate::protocol::{DeviceIdentity, EventPublisher};
use crate::tasks::dispatch::Dispatcher;

fn main() -> anyhow::Result<()> {
    // Link esp-idf-sys runtime patches and initialise logging.
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    log::info!("CallButton firmware {} starting…", FIRMWARE_VERSION);

    // ---- Peripherals & system services ------------------------------------
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let nvs = EspNvs::new(nvs_partition.clone(), NVS_NAMESPACE, true)?;
    let tunables = Tunables::load(&nvs);
    let live = Arc::new(LiveTunables::new(&tunables));

    // ---- LED ring (first, so even boot failures are visible) ---------------
    let mut ring = LedRing::new(peripherals.rmt.channel0, peripherals.pins.gpio17)?;
    ring.set_all(LedColor::Yellow.rgb(), tunables.led_brightness)?;

    // ---- I2C bus (shared between expander and accelerometer) --------------
    let i2c_config = I2cConfig::new().baudrate(400u32.kHz().into());
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio3, // SDA
        peripherals.pins.gpio2, // SCL
        &i2c_config,
    )?;
    let i2c_bus: &'static Mutex<I2cDriver<'static>> = Box::leak(Box::new(Mutex::new(i2c)));

    // ---- Component self-test ----------------------------------------------
    let expander_ok = Mcp23017::new(i2c_bus).is_connected();
    let accel_ok = Lis3dhtr::new(i2c_bus).is_connected();
    log::info!("Self-test — expander:{expander_ok} accel:{accel_ok}");

    if !expander_ok {
        log::error!("GPIO expander unreachable — no buttons, entering degraded mode");
        degraded_loop(ring);
    }
    if !accel_ok {
        log::warn!("Accelerometer unreachable — continuing without shake detection");
    }

    // ---- Touch pad ---------------------------------------------------------
    let touch = match TouchPad::init(tunables.touch_threshold_pct) {
        Ok(pad) => Some(pad),
        Err(e) => {
            log::warn!("Touch pad init failed, continuing without touch: {e:?}");
            None
        }
    };

    // ---- WiFi --------------------------------------------------------------
    let mac = net::mac_address()?;
    let device_id = net::device_id(&mac);
    log::info!("Device id: {device_id}");

    let wifi = match net::connect(peripherals.modem, sysloop, nvs_partition) {
        Ok(wifi) => Some(wifi),
        Err(e) => {
            log::error!("WiFi connect failed, running offline: {e:?}");
            None
        }
    };

    let ident = DeviceIdentity {
        device_id: device_id.clone(),
        mac: net::format_mac(&mac),
        ip: wifi
            .as_ref()
            .map(net::ip_address)
            .unwrap_or_else(|| "0.0.0.0".to_string()),
    };

    // ---- Channels ----------------------------------------------------------
    let (events_tx, events_rx) = mpsc::channel();
    let (led_tx, led_rx) = mpsc::channel();

    // ---- MQTT --------------------------------------------------------------
    let transport = MqttTransport::connect(&device_id, events_tx.clone())?;
    let publisher = Arc::new(Mutex::new(EventPublisher::new(transport, ident)));

    // ---- Voice recorder ----------------------------------------------------
    let mic = I2sMic::new(
        peripherals.i2s0,
        peripherals.pins.gpio33, // BCK
        peripherals.pins.gpio38, // WS
        peripherals.pins.gpio34, // DIN
    )?;
    let recorder = AudioRecorder::new(mic, AUDIO_SAMPLE_RATE, AUDIO_MAX_DURATION_SEC);

    // ---- Spawn tasks (map to FreeRTOS tasks via std::thread) ---------------
    let input_bus = i2c_bus;
    let input_events = events_tx.clone();
    thread::Builder::new()
        .name("input".into())
        .stack_size(STACK_INPUT)
        .spawn(move || {
            tasks::input::input_task(input_bus, touch, tunables, input_events);
        })?;

    if accel_ok {
        let accel_bus = i2c_bus;
        let accel_live = Arc::clone(&live);
        let accel_events = events_tx.clone();
        thread::Builder::new()
            .name("accel".into())
            .stack_size(STACK_ACCEL)
            .spawn(move || {
                tasks::accel::accel_task(accel_bus, accel_live, accel_events);
            })?;
    }

    ring.clear()?;
    let led_live = Arc::clone(&live);
    thread::Builder::new()
        .name("led".into())
        .stack_size(STACK_LED)
        .spawn(move || {
            tasks::led::led_task(ring, led_live, led_rx);
        })?;

    let hb_publisher = Arc::clone(&publisher);
    let hb_live = Arc::clone(&live);
    thread::Builder::new()
        .name("heartbeat".into())
        .stack_size(STACK_HEARTBEAT)
        .spawn(move || {
            tasks::heartbeat::heartbeat_task(hb_publisher, hb_live);
        })?;

    log::info!("Boot complete — entering normal operation");

    // ---- Dispatch loop (main thread) ---------------------------------------
    drop(events_tx);
    Dispatcher::new(publisher, recorder, led_tx, tunables, live, nvs).run(events_rx);

    // run() only returns when every event sender is gone — park so the
    // watchdog (not a process exit) decides what happens next.
    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

/// Terminal failure state: flash the ring red forever so the device is
/// obviously broken instead of silently dead.
fn degraded_loop(mut ring: LedRing) -> ! {
    loop {
        let _ = ring.set_all(LedColor::Red.rgb(), LED_BRIGHTNESS);
        thread::sleep(Duration::from_millis(500));
        let _ = ring.clear();
        thread::sleep(Duration::from_millis(500));
    }
}
