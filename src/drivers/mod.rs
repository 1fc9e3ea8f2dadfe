// CallButton — Hardware Drivers

use std::sync::Mutex;

use esp_idf_hal::i2c::I2cDriver;

/// Thread-safe handle to a shared I2C bus.
pub type SharedBus = &'static Mutex<I2cDriver<'static>>;

pub mod accel;
pub mod expander;
pub mod leds;
pub mod mic;
pub mod touchpad;
