// CallButton — WiFi & Device Identity
//
// Blocking STA bring-up plus the radio-side facts every outbound message
// carries: device id derived from the WiFi MAC, RSSI of the current AP, and
// heap/uptime telemetry read straight from the IDF.

use anyhow::{anyhow, Context, Result};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

use crate::config;
use crate::protocol::LinkStats;

/// Connect to the configured AP and wait for an address. The returned driver
/// must stay alive for the radio to stay up.
pub fn connect(
    modem: Modem,
    sysloop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
) -> Result<BlockingWifi<EspWifi<'static>>> {
    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(modem, sysloop.clone(), Some(nvs))?,
        sysloop,
    )?;

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: config::WIFI_SSID
            .try_into()
            .map_err(|_| anyhow!("SSID too long"))?,
        password: config::WIFI_PASSWORD
            .try_into()
            .map_err(|_| anyhow!("WiFi password too long"))?,
        auth_method: AuthMethod::WPA2Personal,
        ..Default::default()
    }))?;

    wifi.start().context("starting WiFi")?;
    log::info!("Connecting to SSID \"{}\"...", config::WIFI_SSID);
    wifi.connect().context("connecting to AP")?;
    wifi.wait_netif_up().context("waiting for DHCP")?;

    let ip = wifi.wifi().sta_netif().get_ip_info()?.ip;
    log::info!("WiFi up, ip {ip}");
    Ok(wifi)
}

pub fn ip_address(wifi: &BlockingWifi<EspWifi<'static>>) -> String {
    wifi.wifi()
        .sta_netif()
        .get_ip_info()
        .map(|info| info.ip.to_string())
        .unwrap_or_else(|_| "0.0.0.0".to_string())
}

/// WiFi station MAC, readable before the radio is up.
pub fn mac_address() -> Result<[u8; 6]> {
    let mut mac = [0u8; 6];
    esp_idf_sys::esp!(unsafe {
        esp_idf_sys::esp_read_mac(mac.as_mut_ptr(), esp_idf_sys::esp_mac_type_t_ESP_MAC_WIFI_STA)
    })
    .context("reading station MAC")?;
    Ok(mac)
}

/// Stable device id: prefix + the low three MAC octets.
pub fn device_id(mac: &[u8; 6]) -> String {
    format!(
        "{}-{:02x}{:02x}{:02x}",
        config::DEVICE_ID_PREFIX,
        mac[3],
        mac[4],
        mac[5]
    )
}

pub fn format_mac(mac: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

/// RSSI of the associated AP, 0 when not associated.
pub fn rssi() -> i32 {
    let mut ap_info: esp_idf_sys::wifi_ap_record_t = unsafe { core::mem::zeroed() };
    let err = unsafe { esp_idf_sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
    if err == esp_idf_sys::ESP_OK {
        ap_info.rssi as i32
    } else {
        0
    }
}

pub fn uptime_ms() -> u64 {
    (unsafe { esp_idf_sys::esp_timer_get_time() } / 1000) as u64
}

/// Monotonic wrapping-millisecond clock for the gesture classifiers.
pub fn now_ms() -> u32 {
    uptime_ms() as u32
}

/// Wall-clock milliseconds since the epoch. Counts from 1970 until SNTP (or
/// the backend) sets the clock; consumers treat it as an opaque ordering key.
pub fn wall_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Snapshot of device health for an outbound message.
pub fn link_stats() -> LinkStats {
    LinkStats {
        rssi: rssi(),
        // No battery gauge on this PCB revision; reported as full until the
        // fuel-gauge footprint is populated.
        battery_pct: 100,
        free_heap: unsafe { esp_idf_sys::esp_get_free_heap_size() },
        uptime_ms: uptime_ms(),
    }
}
