//! Accel click: ADXL345 3-axis accelerometer over I2C.
//!
//! Measurement runs continuously once `default_cfg` sets POWER_CTL.MEASURE;
//! samples are read as six little-endian bytes starting at DATAX0.

use embedded_hal::i2c::I2c;

use super::{axes_from_le, Axes};
use crate::bus::RegisterBus;
use crate::error::Error;

/// ALT ADDRESS pin high (Click default)
pub const ADDR_PRIMARY: u8 = 0x1D;
/// ALT ADDRESS pin low
pub const ADDR_ALTERNATE: u8 = 0x53;

pub const DEVICE_ID: u8 = 0xE5;

#[allow(dead_code)]
mod reg {
    pub const DEVID: u8 = 0x00;
    pub const OFSX: u8 = 0x1E;
    pub const BW_RATE: u8 = 0x2C;
    pub const POWER_CTL: u8 = 0x2D;
    pub const INT_ENABLE: u8 = 0x2E;
    pub const INT_SOURCE: u8 = 0x30;
    pub const DATA_FORMAT: u8 = 0x31;
    pub const DATAX0: u8 = 0x32;
}

const POWER_CTL_MEASURE: u8 = 0x08;
const INT_SOURCE_DATA_READY: u8 = 0x80;
const DATA_FORMAT_FULL_RES: u8 = 0x08;

/// Measurement range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Range {
    #[default]
    G2 = 0,
    G4 = 1,
    G8 = 2,
    G16 = 3,
}

/// Output data rate (BW_RATE.RATE codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataRate {
    Hz6_25 = 0x06,
    Hz12_5 = 0x07,
    Hz25 = 0x08,
    Hz50 = 0x09,
    #[default]
    Hz100 = 0x0A,
    Hz200 = 0x0B,
    Hz400 = 0x0C,
    Hz800 = 0x0D,
    Hz1600 = 0x0E,
    Hz3200 = 0x0F,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub address: u8,
    pub range: Range,
    pub rate: DataRate,
    /// Keep 3.9 mg/LSB at every range instead of 10-bit output.
    pub full_resolution: bool,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            address: ADDR_PRIMARY,
            range: Range::G2,
            rate: DataRate::Hz100,
            full_resolution: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Accel<I2C> {
    bus: RegisterBus<I2C>,
    config: Config,
}

impl<I2C, E> Accel<I2C>
where
    I2C: I2c<Error = E>,
{
    pub fn new(i2c: I2C, config: Config) -> Self {
        Self {
            bus: RegisterBus::new(i2c, config.address),
            config,
        }
    }

    pub fn release(self) -> I2C {
        self.bus.release()
    }

    /// Check DEVID.
    pub fn init(&mut self) -> Result<(), Error<E>> {
        let id = self.bus.read_reg(reg::DEVID)?;
        if id != DEVICE_ID {
            log::warn!("ADXL345: unexpected DEVID 0x{:02X}", id);
            return Err(Error::UnexpectedId(id));
        }
        log::debug!("ADXL345 found at 0x{:02X}", self.bus.address());
        Ok(())
    }

    /// Program rate and data format from the config, then start measuring.
    pub fn default_cfg(&mut self) -> Result<(), Error<E>> {
        self.bus.write_reg(reg::BW_RATE, self.config.rate as u8)?;
        self.bus.write_reg(reg::DATA_FORMAT, self.data_format())?;
        self.bus.write_reg(reg::POWER_CTL, POWER_CTL_MEASURE)
    }

    pub fn set_range(&mut self, range: Range) -> Result<(), Error<E>> {
        self.config.range = range;
        self.bus.write_reg(reg::DATA_FORMAT, self.data_format())
    }

    pub fn data_ready(&mut self) -> Result<bool, Error<E>> {
        Ok(self.bus.read_reg(reg::INT_SOURCE)? & INT_SOURCE_DATA_READY != 0)
    }

    pub fn read_raw(&mut self) -> Result<Axes<i16>, Error<E>> {
        let mut buf = [0u8; 6];
        self.bus.read_regs(reg::DATAX0, &mut buf)?;
        Ok(axes_from_le(&buf))
    }

    /// Acceleration in milli-g.
    pub fn read_mg(&mut self) -> Result<Axes<i32>, Error<E>> {
        let raw = self.read_raw()?;
        Ok(raw.map(|v| self.to_mg(v)))
    }

    /// Per-axis offset trim, 15.6 mg/LSB.
    pub fn set_offsets(&mut self, x: i8, y: i8, z: i8) -> Result<(), Error<E>> {
        self.bus
            .write_regs(reg::OFSX, &[x as u8, y as u8, z as u8])
    }

    /// Stop measuring; the part drops to standby current.
    pub fn standby(&mut self) -> Result<(), Error<E>> {
        self.bus.modify_reg(reg::POWER_CTL, POWER_CTL_MEASURE, 0)
    }

    fn data_format(&self) -> u8 {
        let full_res = if self.config.full_resolution {
            DATA_FORMAT_FULL_RES
        } else {
            0
        };
        full_res | self.config.range as u8
    }

    // 3.9 mg/LSB in full resolution; 10-bit mode doubles it per range step
    fn to_mg(&self, raw: i16) -> i32 {
        let shift = if self.config.full_resolution {
            0
        } else {
            self.config.range as i32
        };
        (raw as i32 * 39 * (1 << shift)) / 10
    }
}
