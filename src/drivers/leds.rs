// CallButton — WS2812 LED Ring Driver
//
// 16-pixel ring bit-banged over the RMT peripheral. WS2812 wants GRB order,
// MSB first, with a >50 µs low gap as the latch; the blocking transmit plus
// the LED task's 20 ms cadence gives that for free.

use std::time::Duration;

use anyhow::Result;
use esp_idf_hal::gpio::OutputPin;
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::rmt::config::TransmitConfig;
use esp_idf_hal::rmt::{PinState, Pulse, RmtChannel, TxRmtDriver, VariableLengthSignal};

use crate::config::LED_COUNT;

pub struct LedRing {
    tx: TxRmtDriver<'static>,
    t0h: Pulse,
    t0l: Pulse,
    t1h: Pulse,
    t1l: Pulse,
}

impl LedRing {
    pub fn new(
        channel: impl Peripheral<P = impl RmtChannel> + 'static,
        pin: impl Peripheral<P = impl OutputPin> + 'static,
    ) -> Result<Self> {
        let config = TransmitConfig::new().clock_divider(1);
        let tx = TxRmtDriver::new(channel, pin, &config)?;

        // WS2812 bit timing at the RMT counter clock
        let ticks_hz = tx.counter_clock()?;
        let ns = |n: u64| Duration::from_nanos(n);
        let t0h = Pulse::new_with_duration(ticks_hz, PinState::High, &ns(350))?;
        let t0l = Pulse::new_with_duration(ticks_hz, PinState::Low, &ns(800))?;
        let t1h = Pulse::new_with_duration(ticks_hz, PinState::High, &ns(700))?;
        let t1l = Pulse::new_with_duration(ticks_hz, PinState::Low, &ns(600))?;

        Ok(Self { tx, t0h, t0l, t1h, t1l })
    }

    /// Paint the whole ring one color, scaled by brightness (0–255).
    pub fn set_all(&mut self, rgb: (u8, u8, u8), brightness: u8) -> Result<()> {
        let scale = |c: u8| ((c as u16 * brightness as u16) / 255) as u8;
        let (r, g, b) = (scale(rgb.0), scale(rgb.1), scale(rgb.2));
        let grb = ((g as u32) << 16) | ((r as u32) << 8) | b as u32;

        let mut signal = VariableLengthSignal::new();
        for _ in 0..LED_COUNT {
            for bit_pos in (0..24).rev() {
                if grb & (1 << bit_pos) != 0 {
                    signal.push([&self.t1h, &self.t1l])?;
                } else {
                    signal.push([&self.t0h, &self.t0l])?;
                }
            }
        }

        self.tx.start_blocking(&signal)?;
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.set_all((0, 0, 0), 0)
    }
}
