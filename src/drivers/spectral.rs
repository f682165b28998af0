//! Spectral click: AS7262 six-channel visible spectral sensor.
//!
//! The I2C side exposes only three physical registers (STATUS, WRITE,
//! READ). Everything else lives behind them as virtual registers: write
//! the virtual address into WRITE (bit 7 set for a write), then move one
//! data byte through WRITE or READ, waiting on STATUS.TX_VALID/RX_VALID
//! between steps.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::bus::RegisterBus;
use crate::error::Error;

pub const ADDRESS: u8 = 0x49;
pub const DEVICE_TYPE: u8 = 0x40;

/// Channel order of raw and calibrated results
pub const CHANNELS: [&str; 6] = ["violet", "blue", "green", "yellow", "orange", "red"];

mod reg {
    pub const STATUS: u8 = 0x00;
    pub const WRITE: u8 = 0x01;
    pub const READ: u8 = 0x02;
}

#[allow(dead_code)]
mod vreg {
    pub const HW_VERSION: u8 = 0x00;
    pub const FW_VERSION: u8 = 0x02;
    pub const CONTROL_SETUP: u8 = 0x04;
    pub const INT_T: u8 = 0x05;
    pub const DEVICE_TEMP: u8 = 0x06;
    pub const LED_CONTROL: u8 = 0x07;
    pub const RAW_V_HIGH: u8 = 0x08;
    pub const CAL_V: u8 = 0x14;
}

const STATUS_RX_VALID: u8 = 0x01;
const STATUS_TX_VALID: u8 = 0x02;
const WRITE_FLAG: u8 = 0x80;

const CONTROL_RST: u8 = 0x80;
const CONTROL_DATA_RDY: u8 = 0x02;

const LED_IND: u8 = 0x01;
const LED_DRV: u8 = 0x08;
const LED_DRV_CURRENT_MASK: u8 = 0x30;

/// Bus transactions pace the handshake, no extra delay needed.
const HANDSHAKE_POLLS: u32 = 500;
const RESET_MS: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gain {
    X1 = 0,
    X3_7 = 1,
    #[default]
    X16 = 2,
    X64 = 3,
}

/// CONTROL_SETUP.BANK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// V, B, G, Y continuously
    Bank0 = 0,
    /// G, Y, O, R continuously
    Bank1 = 1,
    /// All six continuously
    #[default]
    Continuous = 2,
    /// All six once, then DATA_RDY
    OneShot = 3,
}

/// Bulb driver current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedCurrent {
    #[default]
    Ma12_5 = 0,
    Ma25 = 1,
    Ma50 = 2,
    Ma100 = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub gain: Gain,
    pub mode: Mode,
    /// Integration time in 2.8 ms steps
    pub integration: u8,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            gain: Gain::X16,
            mode: Mode::Continuous,
            integration: 50,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Spectral<I2C> {
    bus: RegisterBus<I2C>,
    config: Config,
}

impl<I2C, E> Spectral<I2C>
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

    pub fn init(&mut self) -> Result<(), Error<E>> {
        let device_type = self.read_virtual(vreg::HW_VERSION)?;
        if device_type != DEVICE_TYPE {
            log::warn!("AS7262: unexpected device type 0x{:02X}", device_type);
            return Err(Error::UnexpectedId(device_type));
        }
        log::debug!("AS7262 found");
        Ok(())
    }

    pub fn default_cfg(&mut self) -> Result<(), Error<E>> {
        self.write_virtual(vreg::INT_T, self.config.integration)?;
        self.write_virtual(vreg::CONTROL_SETUP, self.control_bits(self.config.mode))
    }

    pub fn set_gain(&mut self, gain: Gain) -> Result<(), Error<E>> {
        self.config.gain = gain;
        self.write_virtual(vreg::CONTROL_SETUP, self.control_bits(self.config.mode))
    }

    pub fn set_integration(&mut self, steps: u8) -> Result<(), Error<E>> {
        self.config.integration = steps;
        self.write_virtual(vreg::INT_T, steps)
    }

    pub fn data_ready(&mut self) -> Result<bool, Error<E>> {
        Ok(self.read_virtual(vreg::CONTROL_SETUP)? & CONTROL_DATA_RDY != 0)
    }

    /// Measure all six channels once; poll `data_ready` for the result.
    pub fn start_one_shot(&mut self) -> Result<(), Error<E>> {
        self.write_virtual(vreg::CONTROL_SETUP, self.control_bits(Mode::OneShot))
    }

    /// Raw counts, violet to red.
    pub fn read_raw(&mut self) -> Result<[u16; 6], Error<E>> {
        let mut out = [0u16; 6];
        for (i, value) in out.iter_mut().enumerate() {
            let base = vreg::RAW_V_HIGH + 2 * i as u8;
            let hi = self.read_virtual(base)?;
            let lo = self.read_virtual(base + 1)?;
            *value = u16::from_be_bytes([hi, lo]);
        }
        Ok(out)
    }

    /// Factory-calibrated values in µW/cm², violet to red.
    pub fn read_calibrated(&mut self) -> Result<[f32; 6], Error<E>> {
        let mut out = [0f32; 6];
        for (i, value) in out.iter_mut().enumerate() {
            let base = vreg::CAL_V + 4 * i as u8;
            let mut bytes = [0u8; 4];
            for (j, b) in bytes.iter_mut().enumerate() {
                *b = self.read_virtual(base + j as u8)?;
            }
            *value = f32::from_be_bytes(bytes);
        }
        Ok(out)
    }

    /// Die temperature in °C.
    pub fn temperature(&mut self) -> Result<u8, Error<E>> {
        self.read_virtual(vreg::DEVICE_TEMP)
    }

    /// Illumination bulb on the click.
    pub fn set_led(&mut self, enabled: bool, current: LedCurrent) -> Result<(), Error<E>> {
        let mut value = self.read_virtual(vreg::LED_CONTROL)?;
        value &= !(LED_DRV | LED_DRV_CURRENT_MASK);
        if enabled {
            value |= LED_DRV | (current as u8) << 4;
        }
        self.write_virtual(vreg::LED_CONTROL, value)
    }

    /// Small indicator LED.
    pub fn set_indicator(&mut self, enabled: bool) -> Result<(), Error<E>> {
        let value = self.read_virtual(vreg::LED_CONTROL)?;
        let value = if enabled {
            value | LED_IND
        } else {
            value & !LED_IND
        };
        self.write_virtual(vreg::LED_CONTROL, value)
    }

    /// The part reboots and forgets its configuration.
    pub fn soft_reset<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        self.write_virtual(vreg::CONTROL_SETUP, CONTROL_RST)?;
        delay.delay_ms(RESET_MS);
        Ok(())
    }

    fn control_bits(&self, mode: Mode) -> u8 {
        (self.config.gain as u8) << 4 | (mode as u8) << 2
    }

    fn read_virtual(&mut self, addr: u8) -> Result<u8, Error<E>> {
        self.wait_status(STATUS_TX_VALID, false)?;
        self.bus.write_reg(reg::WRITE, addr)?;
        self.wait_status(STATUS_RX_VALID, true)?;
        self.bus.read_reg(reg::READ)
    }

    fn write_virtual(&mut self, addr: u8, value: u8) -> Result<(), Error<E>> {
        self.wait_status(STATUS_TX_VALID, false)?;
        self.bus.write_reg(reg::WRITE, addr | WRITE_FLAG)?;
        self.wait_status(STATUS_TX_VALID, false)?;
        self.bus.write_reg(reg::WRITE, value)
    }

    fn wait_status(&mut self, bit: u8, set: bool) -> Result<(), Error<E>> {
        for _ in 0..HANDSHAKE_POLLS {
            if (self.bus.read_reg(reg::STATUS)? & bit != 0) == set {
                return Ok(());
            }
        }
        log::warn!("AS7262: virtual register handshake timed out");
        Err(Error::Timeout)
    }
}
