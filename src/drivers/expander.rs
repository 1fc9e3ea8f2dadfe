// CallButton — MCP23017 GPIO Expander Driver
//
// Custom register-level driver over the shared I2C bus. All six buttons sit
// on the GPA bank, read as one byte per poll tick so a multi-button chord
// comes from a single bus transaction.

use crate::config::*;
use crate::drivers::SharedBus;

// MCP23017 register addresses (IOCON.BANK = 0)
const REG_IODIRA: u8 = 0x00;
const REG_GPPUA: u8 = 0x0C;
const REG_GPIOA: u8 = 0x12;

/// Pull-ups for T1–T5 (active-LOW buttons). T6 idles LOW through an external
/// pull-down and must stay floating.
const PULLUP_MASK: u8 = 0xF8;

pub struct Mcp23017 {
    bus: SharedBus,
}

impl Mcp23017 {
    pub fn new(bus: SharedBus) -> Self {
        Self { bus }
    }

    /// Verify the device answers on the bus. The MCP23017 has no ID
    /// register, so a successful register read has to do.
    pub fn is_connected(&self) -> bool {
        let mut bus = self.bus.lock().unwrap();
        let mut buf = [0u8; 1];
        bus.write_read(I2C_ADDR_MCP23017, &[REG_IODIRA], &mut buf, I2C_TIMEOUT_TICKS)
            .is_ok()
    }

    /// All GPA pins as inputs, pull-ups on the active-LOW buttons.
    pub fn init(&self) -> anyhow::Result<()> {
        let mut bus = self.bus.lock().unwrap();

        bus.write(I2C_ADDR_MCP23017, &[REG_IODIRA, 0xFF], I2C_TIMEOUT_TICKS)?;
        bus.write(I2C_ADDR_MCP23017, &[REG_GPPUA, PULLUP_MASK], I2C_TIMEOUT_TICKS)?;

        log::info!("MCP23017 initialised ({BUTTON_COUNT} buttons on GPA)");
        Ok(())
    }

    /// Read the raw GPA bank.
    pub fn read_bank(&self) -> anyhow::Result<u8> {
        let mut bus = self.bus.lock().unwrap();
        let mut buf = [0u8; 1];
        bus.write_read(I2C_ADDR_MCP23017, &[REG_GPIOA], &mut buf, I2C_TIMEOUT_TICKS)?;
        Ok(buf[0])
    }
}

/// Decode a GPA bank byte into per-button pressed levels, honoring each
/// button's wiring polarity.
pub fn decode_bank(bank: u8) -> [bool; BUTTON_COUNT] {
    let mut pressed = [false; BUTTON_COUNT];
    for (i, p) in pressed.iter_mut().enumerate() {
        let high = bank & (1 << BUTTON_PINS[i]) != 0;
        *p = high == BUTTON_INVERTED[i];
    }
    pressed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_bank_reads_no_buttons() {
        // T1–T5 idle HIGH (pull-ups), T6 idles LOW.
        let idle = PULLUP_MASK;
        assert_eq!(decode_bank(idle), [false; BUTTON_COUNT]);
    }

    #[test]
    fn main_button_pulls_its_pin_low() {
        let bank = PULLUP_MASK & !(1 << BUTTON_PINS[MAIN_BUTTON]);
        let pressed = decode_bank(bank);
        assert!(pressed[MAIN_BUTTON]);
        assert_eq!(pressed.iter().filter(|&&p| p).count(), 1);
    }

    #[test]
    fn inverted_button_is_active_high() {
        let bank = PULLUP_MASK | (1 << BUTTON_PINS[5]);
        let pressed = decode_bank(bank);
        assert!(pressed[5]);
        assert_eq!(pressed.iter().filter(|&&p| p).count(), 1);
    }

    #[test]
    fn chord_decodes_every_member() {
        let mut bank = PULLUP_MASK;
        bank &= !(1 << BUTTON_PINS[0]);
        bank &= !(1 << BUTTON_PINS[2]);
        bank |= 1 << BUTTON_PINS[5];

        let pressed = decode_bank(bank);
        assert_eq!(pressed, [true, false, true, false, false, true]);
    }
}
