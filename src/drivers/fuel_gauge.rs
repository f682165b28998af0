//! Fuel Gauge click: MAX17043 single-cell Li-ion fuel gauge over I2C.
//!
//! All registers are 16 bits wide, MSB first.
//! VCELL: 12-bit ADC in the upper bits, 1.25 mV/LSB.
//! SOC: high byte is whole percent, low byte is 1/256 %.
//! CONFIG: RCOMP in the high byte; SLEEP (bit 7), ALRT (bit 5) and the
//! alert threshold ATHD (bits 4:0, alert at 32 − ATHD %) in the low byte.

use embedded_hal::i2c::I2c;

use crate::bus::RegisterBus;
use crate::error::Error;

pub const ADDRESS: u8 = 0x36;

#[allow(dead_code)]
mod reg {
    pub const VCELL: u8 = 0x02;
    pub const SOC: u8 = 0x04;
    pub const MODE: u8 = 0x06;
    pub const VERSION: u8 = 0x08;
    pub const CONFIG: u8 = 0x0C;
    pub const COMMAND: u8 = 0xFE;
}

const MODE_QUICK_START: u16 = 0x4000;
const COMMAND_POR: u16 = 0x0054;

const CONFIG_SLEEP: u16 = 0x0080;
const CONFIG_ALRT: u16 = 0x0020;
const CONFIG_ATHD_MASK: u16 = 0x001F;

/// Factory RCOMP value
pub const DEFAULT_RCOMP: u8 = 0x97;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Compensation value tuned per battery chemistry
    pub rcomp: u8,
    /// Alert when state of charge drops below this percentage (1..=32)
    pub alert_percent: u8,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            rcomp: DEFAULT_RCOMP,
            alert_percent: 4,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FuelGauge<I2C> {
    bus: RegisterBus<I2C>,
    config: Config,
}

impl<I2C, E> FuelGauge<I2C>
where
    I2C: I2c<Error = E>,
{
    pub fn new(i2c: I2C, config: Config) -> Self {
        Self {
            bus: RegisterBus::new(i2c, ADDRESS),
            config,
        }
    }

    pub fn release(self) -> I2C {
        self.bus.release()
    }

    /// The part has no ID register; a zero VERSION means nobody answered
    /// sensibly.
    pub fn init(&mut self) -> Result<u16, Error<E>> {
        let version = self.version()?;
        if version == 0 {
            return Err(Error::UnexpectedId(0));
        }
        log::debug!("MAX17043 version 0x{:04X}", version);
        Ok(version)
    }

    pub fn default_cfg(&mut self) -> Result<(), Error<E>> {
        let athd = athd_for(self.config.alert_percent).ok_or(Error::InvalidArgument)?;
        self.bus
            .write_u16_be(reg::CONFIG, (self.config.rcomp as u16) << 8 | athd)
    }

    pub fn version(&mut self) -> Result<u16, Error<E>> {
        self.bus.read_u16_be(reg::VERSION)
    }

    /// Cell voltage in millivolts.
    pub fn voltage_mv(&mut self) -> Result<u16, Error<E>> {
        let raw = self.bus.read_u16_be(reg::VCELL)? >> 4;
        Ok((raw as u32 * 5 / 4) as u16)
    }

    /// State of charge in hundredths of a percent.
    pub fn state_of_charge_centi(&mut self) -> Result<u16, Error<E>> {
        let raw = self.bus.read_u16_be(reg::SOC)?;
        Ok((raw as u32 * 100 / 256) as u16)
    }

    /// Restart the SOC estimate from the present cell voltage.
    pub fn quick_start(&mut self) -> Result<(), Error<E>> {
        self.bus.write_u16_be(reg::MODE, MODE_QUICK_START)
    }

    /// Full power-on reset. The part resets before acknowledging, so a bus
    /// error on this write is expected and swallowed.
    pub fn power_on_reset(&mut self) -> Result<(), Error<E>> {
        if self.bus.write_u16_be(reg::COMMAND, COMMAND_POR).is_err() {
            log::debug!("MAX17043: POR write not acknowledged");
        }
        Ok(())
    }

    pub fn set_sleep(&mut self, sleep: bool) -> Result<(), Error<E>> {
        let bits = if sleep { CONFIG_SLEEP } else { 0 };
        self.modify_config(CONFIG_SLEEP, bits)
    }

    /// True once SOC fell below the alert threshold; stays set until cleared.
    pub fn alert(&mut self) -> Result<bool, Error<E>> {
        Ok(self.bus.read_u16_be(reg::CONFIG)? & CONFIG_ALRT != 0)
    }

    pub fn clear_alert(&mut self) -> Result<(), Error<E>> {
        self.modify_config(CONFIG_ALRT, 0)
    }

    pub fn set_alert_threshold(&mut self, percent: u8) -> Result<(), Error<E>> {
        let athd = athd_for(percent).ok_or(Error::InvalidArgument)?;
        self.config.alert_percent = percent;
        self.modify_config(CONFIG_ATHD_MASK, athd)
    }

    pub fn set_rcomp(&mut self, rcomp: u8) -> Result<(), Error<E>> {
        self.config.rcomp = rcomp;
        self.modify_config(0xFF00, (rcomp as u16) << 8)
    }

    fn modify_config(&mut self, mask: u16, bits: u16) -> Result<(), Error<E>> {
        let current = self.bus.read_u16_be(reg::CONFIG)?;
        self.bus
            .write_u16_be(reg::CONFIG, (current & !mask) | (bits & mask))
    }
}

fn athd_for(percent: u8) -> Option<u16> {
    match percent {
        1..=32 => Some((32 - percent as u16) & CONFIG_ATHD_MASK),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction};

    const A: u8 = ADDRESS;

    #[test]
    fn init_reads_version() {
        let mut i2c = I2cMock::new(&[
            Transaction::write_read(A, vec![0x08], vec![0x00, 0x03]),
            Transaction::write_read(A, vec![0x08], vec![0x00, 0x00]),
        ]);
        let mut gauge = FuelGauge::new(i2c.clone(), Config::new());
        assert_eq!(gauge.init().unwrap(), 3);
        assert_eq!(gauge.init(), Err(Error::UnexpectedId(0)));
        i2c.done();
    }

    #[test]
    fn default_cfg_writes_rcomp_and_threshold() {
        let mut i2c = I2cMock::new(&[Transaction::write(A, vec![0x0C, 0x97, 0x1C])]);
        let mut gauge = FuelGauge::new(i2c.clone(), Config::new());
        gauge.default_cfg().unwrap();
        i2c.done();
    }

    #[test]
    fn voltage_uses_upper_twelve_bits() {
        // 0xD2F0 >> 4 = 3375 LSB * 1.25 mV = 4218 mV
        let mut i2c = I2cMock::new(&[Transaction::write_read(A, vec![0x02], vec![0xD2, 0xF0])]);
        let mut gauge = FuelGauge::new(i2c.clone(), Config::new());
        assert_eq!(gauge.voltage_mv().unwrap(), 4218);
        i2c.done();
    }

    #[test]
    fn state_of_charge_has_fraction() {
        let mut i2c = I2cMock::new(&[Transaction::write_read(A, vec![0x04], vec![57, 128])]);
        let mut gauge = FuelGauge::new(i2c.clone(), Config::new());
        assert_eq!(gauge.state_of_charge_centi().unwrap(), 5750);
        i2c.done();
    }

    #[test]
    fn alert_threshold_bounds() {
        let mut i2c = I2cMock::new(&[
            Transaction::write_read(A, vec![0x0C], vec![0x97, 0x3C]),
            Transaction::write(A, vec![0x0C, 0x97, 0x3F]),
        ]);
        let mut gauge = FuelGauge::new(i2c.clone(), Config::new());
        assert_eq!(gauge.set_alert_threshold(0), Err(Error::InvalidArgument));
        assert_eq!(gauge.set_alert_threshold(33), Err(Error::InvalidArgument));
        // 1 % → ATHD 31, ALRT (bit 5) left alone
        gauge.set_alert_threshold(1).unwrap();
        i2c.done();
    }

    #[test]
    fn alert_flag_and_clear() {
        let mut i2c = I2cMock::new(&[
            Transaction::write_read(A, vec![0x0C], vec![0x97, 0x3C]),
            Transaction::write_read(A, vec![0x0C], vec![0x97, 0x3C]),
            Transaction::write(A, vec![0x0C, 0x97, 0x1C]),
        ]);
        let mut gauge = FuelGauge::new(i2c.clone(), Config::new());
        assert!(gauge.alert().unwrap());
        gauge.clear_alert().unwrap();
        i2c.done();
    }

    #[test]
    fn sleep_quick_start_and_por() {
        let mut i2c = I2cMock::new(&[
            Transaction::write_read(A, vec![0x0C], vec![0x97, 0x1C]),
            Transaction::write(A, vec![0x0C, 0x97, 0x9C]),
            Transaction::write(A, vec![0x06, 0x40, 0x00]),
            Transaction::write(A, vec![0xFE, 0x00, 0x54]),
        ]);
        let mut gauge = FuelGauge::new(i2c.clone(), Config::new());
        gauge.set_sleep(true).unwrap();
        gauge.quick_start().unwrap();
        gauge.power_on_reset().unwrap();
        i2c.done();
    }

    #[test]
    fn set_rcomp_keeps_low_byte() {
        let mut i2c = I2cMock::new(&[
            Transaction::write_read(A, vec![0x0C], vec![0x97, 0x1C]),
            Transaction::write(A, vec![0x0C, 0x60, 0x1C]),
        ]);
        let mut gauge = FuelGauge::new(i2c.clone(), Config::new());
        gauge.set_rcomp(0x60).unwrap();
        i2c.done();
    }
}
