// CallButton — Capacitive Touch Pad Driver
//
// The HAL has no touch-sensor wrapper, so this talks to the IDF driver
// through esp_idf_sys directly. The pad is calibrated at boot: the no-touch
// baseline is averaged over a handful of reads and the trip point set to a
// percentage of it. A finger loads the pad and the reading drops below the
// trip point.

use anyhow::{Context, Result};
use esp_idf_hal::delay::FreeRtos;
use esp_idf_sys::{
    esp, touch_fsm_mode_t_TOUCH_FSM_MODE_TIMER, touch_pad_config, touch_pad_fsm_start,
    touch_pad_init, touch_pad_read_raw_data, touch_pad_set_fsm_mode, touch_pad_t,
};

use crate::config;

const PAD: touch_pad_t = config::TOUCH_PAD_NUM as touch_pad_t;

pub struct TouchPad {
    threshold: u32,
}

impl TouchPad {
    /// Bring up the touch FSM and calibrate against the untouched pad. Must
    /// run before anyone can be expected to touch the device.
    pub fn init(threshold_pct: u32) -> Result<Self> {
        unsafe {
            esp!(touch_pad_init()).context("touch_pad_init")?;
            esp!(touch_pad_config(PAD)).context("touch_pad_config")?;
            esp!(touch_pad_set_fsm_mode(touch_fsm_mode_t_TOUCH_FSM_MODE_TIMER))
                .context("touch_pad_set_fsm_mode")?;
            esp!(touch_pad_fsm_start()).context("touch_pad_fsm_start")?;
        }

        // Let the FSM settle before sampling the baseline.
        FreeRtos::delay_ms(100);

        let mut sum: u64 = 0;
        for _ in 0..config::TOUCH_CALIBRATION_SAMPLES {
            sum += Self::read_raw()? as u64;
            FreeRtos::delay_ms(10);
        }

        let baseline = (sum / config::TOUCH_CALIBRATION_SAMPLES as u64) as u32;
        let threshold = trip_point(baseline, threshold_pct);
        log::info!("Touch pad calibrated: baseline {baseline}, threshold {threshold} ({threshold_pct}%)");

        Ok(Self { threshold })
    }

    fn read_raw() -> Result<u32> {
        let mut value: u32 = 0;
        esp!(unsafe { touch_pad_read_raw_data(PAD, &mut value) }).context("touch read")?;
        Ok(value)
    }

    /// One poll: `true` while a finger is on the pad.
    pub fn is_touched(&self) -> Result<bool> {
        Ok(Self::read_raw()? < self.threshold)
    }
}

fn trip_point(baseline: u32, pct: u32) -> u32 {
    (baseline as u64 * pct as u64 / 100) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trip_point_is_a_percentage_of_baseline() {
        assert_eq!(trip_point(50_000, 80), 40_000);
        assert_eq!(trip_point(3, 80), 2); // rounds down
        // Large baselines must not overflow the intermediate product.
        assert_eq!(trip_point(u32::MAX, 95), (u32::MAX as u64 * 95 / 100) as u32);
    }
}
