// CallButton — I2S MEMS Microphone Driver
//
// Standard-mode I2S receive, 16-bit mono at 16 kHz. Wraps the HAL driver in
// the recorder's `CaptureSource` contract; a read timeout reports zero
// samples rather than an error so a slow DMA refill never kills a take.

use std::time::Duration;

use anyhow::{Context, Result};
use esp_idf_hal::delay::TickType;
use esp_idf_hal::gpio::{AnyIOPin, InputPin, OutputPin};
use esp_idf_hal::i2s::config::{
    Config, DataBitWidth, SlotMode, StdClkConfig, StdConfig, StdGpioConfig, StdSlotConfig,
};
use esp_idf_hal::i2s::{I2s, I2sDriver, I2sRx};
use esp_idf_hal::peripheral::Peripheral;

use crate::audio::CaptureSource;
use crate::config;

pub struct I2sMic {
    driver: I2sDriver<'static, I2sRx>,
}

impl I2sMic {
    pub fn new(
        i2s: impl Peripheral<P = impl I2s> + 'static,
        bclk: impl Peripheral<P = impl InputPin + OutputPin> + 'static,
        ws: impl Peripheral<P = impl InputPin + OutputPin> + 'static,
        din: impl Peripheral<P = impl InputPin> + 'static,
    ) -> Result<Self> {
        let cfg = StdConfig::new(
            Config::default(),
            StdClkConfig::from_sample_rate_hz(config::AUDIO_SAMPLE_RATE),
            StdSlotConfig::philips_slot_default(DataBitWidth::Bits16, SlotMode::Mono),
            StdGpioConfig::default(),
        );

        let driver = I2sDriver::new_std_rx(i2s, &cfg, bclk, din, Option::<AnyIOPin>::None, ws)
            .context("creating I2S rx driver")?;

        log::info!("I2S microphone ready ({} Hz mono)", config::AUDIO_SAMPLE_RATE);
        Ok(Self { driver })
    }
}

impl CaptureSource for I2sMic {
    fn start(&mut self) -> Result<()> {
        self.driver.rx_enable().context("enabling I2S rx")?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
        // The DMA hands out bytes; reinterpret the sample buffer in place.
        let bytes = unsafe {
            core::slice::from_raw_parts_mut(buf.as_mut_ptr() as *mut u8, buf.len() * 2)
        };

        let timeout = TickType::from(Duration::from_millis(100)).0;
        match self.driver.read(bytes, timeout) {
            Ok(n) => Ok(n / 2),
            Err(e) if e.code() == esp_idf_sys::ESP_ERR_TIMEOUT => Ok(0),
            Err(e) => Err(e).context("I2S read"),
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.driver.rx_disable().context("disabling I2S rx")?;
        Ok(())
    }
}
