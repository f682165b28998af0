//! LightRanger click: VL6180X time-of-flight range and ambient light sensor.
//!
//! Registers use 16-bit addresses. The chip must be fed a block of private
//! tuning settings after every power-up; SYSTEM__FRESH_OUT_OF_RESET tells
//! whether that already happened.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;

use super::poll_until;
use crate::bus::RegisterBus;
use crate::error::Error;

pub const ADDRESS: u8 = 0x29;
pub const MODEL_ID: u8 = 0xB4;

#[allow(dead_code)]
mod reg {
    pub const IDENTIFICATION_MODEL_ID: u16 = 0x000;
    pub const SYSTEM_INTERRUPT_CONFIG_GPIO: u16 = 0x014;
    pub const SYSTEM_INTERRUPT_CLEAR: u16 = 0x015;
    pub const SYSTEM_FRESH_OUT_OF_RESET: u16 = 0x016;
    pub const SYSRANGE_START: u16 = 0x018;
    pub const SYSALS_START: u16 = 0x038;
    pub const RESULT_RANGE_STATUS: u16 = 0x04D;
    pub const RESULT_INTERRUPT_STATUS_GPIO: u16 = 0x04F;
    pub const RESULT_ALS_VAL: u16 = 0x050;
    pub const RESULT_RANGE_VAL: u16 = 0x062;
    pub const I2C_SLAVE_DEVICE_ADDRESS: u16 = 0x212;
}

const START_SINGLE_SHOT: u8 = 0x01;
const CLEAR_ALL_INTERRUPTS: u8 = 0x07;
const INTERRUPT_NEW_SAMPLE: u8 = 4;

const BOOT_MS: u32 = 1;
const MEASURE_POLLS: u32 = 100;
const MEASURE_POLL_US: u32 = 1000;

/// Mandatory settings from the vendor application note, loaded once after
/// power-up.
const PRIVATE_SETTINGS: [(u16, u8); 30] = [
    (0x0207, 0x01),
    (0x0208, 0x01),
    (0x0096, 0x00),
    (0x0097, 0xFD),
    (0x00E3, 0x00),
    (0x00E4, 0x04),
    (0x00E5, 0x02),
    (0x00E6, 0x01),
    (0x00E7, 0x03),
    (0x00F5, 0x02),
    (0x00D9, 0x05),
    (0x00DB, 0xCE),
    (0x00DC, 0x03),
    (0x00DD, 0xF8),
    (0x009F, 0x00),
    (0x00A3, 0x3C),
    (0x00B7, 0x00),
    (0x00BB, 0x3C),
    (0x00B2, 0x09),
    (0x00CA, 0x09),
    (0x0198, 0x01),
    (0x01B0, 0x17),
    (0x01AD, 0x00),
    (0x00FF, 0x05),
    (0x0100, 0x05),
    (0x0199, 0x05),
    (0x01A6, 0x1B),
    (0x01AC, 0x3E),
    (0x01A7, 0x1F),
    (0x0030, 0x00),
];

/// Recommended public settings: interrupt on new sample, ALS gain 1,
/// 100 ms ALS integration, 10 ms range check.
const PUBLIC_SETTINGS: [(u16, u8); 9] = [
    (0x0011, 0x10),
    (0x010A, 0x30),
    (0x003F, 0x46),
    (0x0031, 0xFF),
    (0x0040, 0x63),
    (0x002E, 0x01),
    (0x001B, 0x09),
    (0x003E, 0x31),
    (0x0014, 0x24),
];

pub struct RangeSensor<I2C, CE> {
    bus: RegisterBus<I2C>,
    ce: CE,
}

impl<I2C, CE, E> RangeSensor<I2C, CE>
where
    I2C: I2c<Error = E>,
    CE: OutputPin,
{
    pub fn new(i2c: I2C, ce: CE) -> Self {
        Self {
            bus: RegisterBus::new(i2c, ADDRESS),
            ce,
        }
    }

    pub fn release(self) -> (I2C, CE) {
        (self.bus.release(), self.ce)
    }

    pub fn address(&self) -> u8 {
        self.bus.address()
    }

    /// Enable the chip, check MODEL_ID and load the private settings if
    /// it just came out of reset.
    pub fn init<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        self.ce.set_high().map_err(|_| Error::Pin)?;
        delay.delay_ms(BOOT_MS);

        let id = self.bus.read_reg16(reg::IDENTIFICATION_MODEL_ID)?;
        if id != MODEL_ID {
            log::warn!("VL6180X: unexpected model 0x{:02X}", id);
            return Err(Error::UnexpectedId(id));
        }

        if self.bus.read_reg16(reg::SYSTEM_FRESH_OUT_OF_RESET)? == 0x01 {
            for (reg, value) in PRIVATE_SETTINGS {
                self.bus.write_reg16(reg, value)?;
            }
            self.bus.write_reg16(reg::SYSTEM_FRESH_OUT_OF_RESET, 0x00)?;
            log::debug!("VL6180X: loaded private settings");
        }
        Ok(())
    }

    pub fn default_cfg(&mut self) -> Result<(), Error<E>> {
        for (reg, value) in PUBLIC_SETTINGS {
            self.bus.write_reg16(reg, value)?;
        }
        Ok(())
    }

    /// Single-shot range measurement in millimetres.
    pub fn read_range_mm<D: DelayNs>(&mut self, delay: &mut D) -> Result<u8, Error<E>> {
        self.bus.write_reg16(reg::SYSRANGE_START, START_SINGLE_SHOT)?;
        poll_until(delay, MEASURE_POLLS, MEASURE_POLL_US, || {
            let status = self.bus.read_reg16(reg::RESULT_INTERRUPT_STATUS_GPIO)?;
            Ok(status & 0x07 == INTERRUPT_NEW_SAMPLE)
        })?;

        let range = self.bus.read_reg16(reg::RESULT_RANGE_VAL)?;
        self.bus
            .write_reg16(reg::SYSTEM_INTERRUPT_CLEAR, CLEAR_ALL_INTERRUPTS)?;

        let code = self.bus.read_reg16(reg::RESULT_RANGE_STATUS)? >> 4;
        if code != 0 {
            log::debug!("VL6180X: range error code {}", code);
            return Err(Error::Device(code));
        }
        Ok(range)
    }

    /// Single-shot ambient light measurement, raw counts.
    pub fn read_ambient_raw<D: DelayNs>(&mut self, delay: &mut D) -> Result<u16, Error<E>> {
        self.bus.write_reg16(reg::SYSALS_START, START_SINGLE_SHOT)?;
        poll_until(delay, MEASURE_POLLS, MEASURE_POLL_US, || {
            let status = self.bus.read_reg16(reg::RESULT_INTERRUPT_STATUS_GPIO)?;
            Ok((status >> 3) & 0x07 == INTERRUPT_NEW_SAMPLE)
        })?;

        let mut buf = [0u8; 2];
        self.bus.read_regs16(reg::RESULT_ALS_VAL, &mut buf)?;
        self.bus
            .write_reg16(reg::SYSTEM_INTERRUPT_CLEAR, CLEAR_ALL_INTERRUPTS)?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Move the chip to another I2C address. Lasts until the next power
    /// cycle or CE toggle.
    pub fn set_address(&mut self, address: u8) -> Result<(), Error<E>> {
        self.bus
            .write_reg16(reg::I2C_SLAVE_DEVICE_ADDRESS, address & 0x7F)?;
        self.bus.set_address(address & 0x7F);
        Ok(())
    }

    /// Drop CE; the chip loses its settings.
    pub fn shutdown(&mut self) -> Result<(), Error<E>> {
        self.ce.set_low().map_err(|_| Error::Pin)
    }
}

/// Milli-lux for a raw ALS count at gain 1 and 100 ms integration
/// (0.32 lux/count, divided by the 1.01 gain).
pub fn lux(raw: u16) -> u32 {
    raw as u32 * 32_000 / 101
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction as PinTx};
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction};

    const A: u8 = ADDRESS;

    fn write16(reg: u16, value: u8) -> Transaction {
        let [hi, lo] = reg.to_be_bytes();
        Transaction::write(A, vec![hi, lo, value])
    }

    fn read16(reg: u16, value: &[u8]) -> Transaction {
        Transaction::write_read(A, reg.to_be_bytes().to_vec(), value.to_vec())
    }

    #[test]
    fn init_loads_private_settings_once() {
        let mut expected = vec![read16(0x000, &[0xB4]), read16(0x016, &[0x01])];
        expected.extend(PRIVATE_SETTINGS.iter().map(|&(r, v)| write16(r, v)));
        expected.push(write16(0x016, 0x00));
        expected.push(read16(0x000, &[0xB4]));
        expected.push(read16(0x016, &[0x00]));

        let mut i2c = I2cMock::new(&expected);
        let mut ce = PinMock::new(&[PinTx::set(State::High), PinTx::set(State::High)]);
        let mut sensor = RangeSensor::new(i2c.clone(), ce.clone());
        sensor.init(&mut NoopDelay::new()).unwrap();
        sensor.init(&mut NoopDelay::new()).unwrap();
        i2c.done();
        ce.done();
    }

    #[test]
    fn init_rejects_wrong_model() {
        let mut i2c = I2cMock::new(&[read16(0x000, &[0xEE])]);
        let mut ce = PinMock::new(&[PinTx::set(State::High)]);
        let mut sensor = RangeSensor::new(i2c.clone(), ce.clone());
        assert_eq!(sensor.init(&mut NoopDelay::new()), Err(Error::UnexpectedId(0xEE)));
        i2c.done();
        ce.done();
    }

    #[test]
    fn default_cfg_writes_public_settings() {
        let expected: Vec<_> = PUBLIC_SETTINGS.iter().map(|&(r, v)| write16(r, v)).collect();
        let mut i2c = I2cMock::new(&expected);
        let mut ce = PinMock::new(&[]);
        let mut sensor = RangeSensor::new(i2c.clone(), ce.clone());
        sensor.default_cfg().unwrap();
        i2c.done();
        ce.done();
    }

    #[test]
    fn single_shot_range() {
        let mut i2c = I2cMock::new(&[
            write16(0x018, 0x01),
            read16(0x04F, &[0x00]),
            read16(0x04F, &[0x04]),
            read16(0x062, &[87]),
            write16(0x015, 0x07),
            read16(0x04D, &[0x01]),
        ]);
        let mut ce = PinMock::new(&[]);
        let mut sensor = RangeSensor::new(i2c.clone(), ce.clone());
        assert_eq!(sensor.read_range_mm(&mut NoopDelay::new()).unwrap(), 87);
        i2c.done();
        ce.done();
    }

    #[test]
    fn range_error_code_is_reported() {
        let mut i2c = I2cMock::new(&[
            write16(0x018, 0x01),
            read16(0x04F, &[0x04]),
            read16(0x062, &[255]),
            write16(0x015, 0x07),
            // code 11: range overflow
            read16(0x04D, &[0xB1]),
        ]);
        let mut ce = PinMock::new(&[]);
        let mut sensor = RangeSensor::new(i2c.clone(), ce.clone());
        assert_eq!(
            sensor.read_range_mm(&mut NoopDelay::new()),
            Err(Error::Device(11))
        );
        i2c.done();
        ce.done();
    }

    #[test]
    fn ambient_light() {
        let mut i2c = I2cMock::new(&[
            write16(0x038, 0x01),
            read16(0x04F, &[0x20]),
            read16(0x050, &[0x01, 0x00]),
            write16(0x015, 0x07),
        ]);
        let mut ce = PinMock::new(&[]);
        let mut sensor = RangeSensor::new(i2c.clone(), ce.clone());
        let raw = sensor.read_ambient_raw(&mut NoopDelay::new()).unwrap();
        assert_eq!(raw, 256);
        assert_eq!(lux(raw), 81_108);
        i2c.done();
        ce.done();
    }

    #[test]
    fn set_address_moves_the_bus() {
        let mut i2c = I2cMock::new(&[
            write16(0x212, 0x30),
            Transaction::write_read(0x30, vec![0x00, 0x62], vec![10]),
        ]);
        let mut ce = PinMock::new(&[PinTx::set(State::Low)]);
        let mut sensor = RangeSensor::new(i2c.clone(), ce.clone());
        sensor.set_address(0x30).unwrap();
        assert_eq!(sensor.address(), 0x30);
        assert_eq!(sensor.bus.read_reg16(0x062).unwrap(), 10);
        sensor.shutdown().unwrap();
        i2c.done();
        ce.done();
    }

    #[test]
    fn measurement_times_out() {
        let mut expected = vec![write16(0x018, 0x01)];
        expected.extend((0..MEASURE_POLLS).map(|_| read16(0x04F, &[0x00])));
        let mut i2c = I2cMock::new(&expected);
        let mut ce = PinMock::new(&[]);
        let mut sensor = RangeSensor::new(i2c.clone(), ce.clone());
        assert_eq!(sensor.read_range_mm(&mut NoopDelay::new()), Err(Error::Timeout));
        i2c.done();
        ce.done();
    }
}
