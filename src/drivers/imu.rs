//! 6DOF IMU click: LSM6DSL accelerometer + gyroscope over I2C.
//!
//! Block data update and address auto-increment are always enabled so a
//! burst read of an axis triple never mixes two samples.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::{axes_from_le, poll_until, Axes};
use crate::bus::RegisterBus;
use crate::error::Error;

/// SA0 low (Click default)
pub const ADDR_PRIMARY: u8 = 0x6A;
/// SA0 high
pub const ADDR_ALTERNATE: u8 = 0x6B;

pub const WHO_AM_I_VALUE: u8 = 0x6A;

#[allow(dead_code)]
mod reg {
    pub const WHO_AM_I: u8 = 0x0F;
    pub const CTRL1_XL: u8 = 0x10;
    pub const CTRL2_G: u8 = 0x11;
    pub const CTRL3_C: u8 = 0x12;
    pub const STATUS_REG: u8 = 0x1E;
    pub const OUT_TEMP_L: u8 = 0x20;
    pub const OUTX_L_G: u8 = 0x22;
    pub const OUTX_L_XL: u8 = 0x28;
}

const CTRL3_C_BDU: u8 = 0x40;
const CTRL3_C_IF_INC: u8 = 0x04;
const CTRL3_C_SW_RESET: u8 = 0x01;

const RESET_POLLS: u32 = 10;
const RESET_POLL_US: u32 = 1000;

/// Output data rate shared by both sensors (ODR field codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputDataRate {
    PowerDown = 0,
    Hz12_5 = 1,
    Hz26 = 2,
    Hz52 = 3,
    #[default]
    Hz104 = 4,
    Hz208 = 5,
    Hz416 = 6,
    Hz833 = 7,
    Hz1660 = 8,
    Hz3330 = 9,
    Hz6660 = 10,
}

/// Accelerometer full scale. Discriminants are the FS_XL codes, which are
/// not in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccelScale {
    #[default]
    G2 = 0,
    G16 = 1,
    G4 = 2,
    G8 = 3,
}

impl AccelScale {
    /// Sensitivity in µg/LSB.
    pub const fn micro_g_per_lsb(self) -> i32 {
        match self {
            AccelScale::G2 => 61,
            AccelScale::G4 => 122,
            AccelScale::G8 => 244,
            AccelScale::G16 => 488,
        }
    }
}

/// Gyroscope full scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GyroScale {
    Dps125,
    #[default]
    Dps250,
    Dps500,
    Dps1000,
    Dps2000,
}

impl GyroScale {
    /// FS_G in bits 3:2, FS_125 in bit 1.
    const fn ctrl_bits(self) -> u8 {
        match self {
            GyroScale::Dps125 => 0b0010,
            GyroScale::Dps250 => 0b0000,
            GyroScale::Dps500 => 0b0100,
            GyroScale::Dps1000 => 0b1000,
            GyroScale::Dps2000 => 0b1100,
        }
    }

    /// Sensitivity in µdps/LSB.
    pub const fn micro_dps_per_lsb(self) -> i32 {
        match self {
            GyroScale::Dps125 => 4_375,
            GyroScale::Dps250 => 8_750,
            GyroScale::Dps500 => 17_500,
            GyroScale::Dps1000 => 35_000,
            GyroScale::Dps2000 => 70_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub address: u8,
    pub accel_rate: OutputDataRate,
    pub accel_scale: AccelScale,
    pub gyro_rate: OutputDataRate,
    pub gyro_scale: GyroScale,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            address: ADDR_PRIMARY,
            accel_rate: OutputDataRate::Hz104,
            accel_scale: AccelScale::G2,
            gyro_rate: OutputDataRate::Hz104,
            gyro_scale: GyroScale::Dps250,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// STATUS_REG data-available flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataStatus {
    pub accel: bool,
    pub gyro: bool,
    pub temperature: bool,
}

pub struct Imu<I2C> {
    bus: RegisterBus<I2C>,
    config: Config,
}

impl<I2C, E> Imu<I2C>
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

    pub fn init(&mut self) -> Result<(), Error<E>> {
        let id = self.bus.read_reg(reg::WHO_AM_I)?;
        if id != WHO_AM_I_VALUE {
            log::warn!("LSM6DSL: unexpected WHO_AM_I 0x{:02X}", id);
            return Err(Error::UnexpectedId(id));
        }
        Ok(())
    }

    /// Software reset, then program both sensors from the config.
    pub fn default_cfg<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        self.bus.write_reg(reg::CTRL3_C, CTRL3_C_SW_RESET)?;
        let bus = &mut self.bus;
        poll_until(delay, RESET_POLLS, RESET_POLL_US, || {
            Ok(bus.read_reg(reg::CTRL3_C)? & CTRL3_C_SW_RESET == 0)
        })?;

        self.bus
            .write_reg(reg::CTRL3_C, CTRL3_C_BDU | CTRL3_C_IF_INC)?;
        self.bus.write_reg(
            reg::CTRL1_XL,
            (self.config.accel_rate as u8) << 4 | (self.config.accel_scale as u8) << 2,
        )?;
        self.bus.write_reg(
            reg::CTRL2_G,
            (self.config.gyro_rate as u8) << 4 | self.config.gyro_scale.ctrl_bits(),
        )
    }

    pub fn status(&mut self) -> Result<DataStatus, Error<E>> {
        let s = self.bus.read_reg(reg::STATUS_REG)?;
        Ok(DataStatus {
            accel: s & 0x01 != 0,
            gyro: s & 0x02 != 0,
            temperature: s & 0x04 != 0,
        })
    }

    pub fn read_accel_raw(&mut self) -> Result<Axes<i16>, Error<E>> {
        self.read_axes(reg::OUTX_L_XL)
    }

    pub fn read_gyro_raw(&mut self) -> Result<Axes<i16>, Error<E>> {
        self.read_axes(reg::OUTX_L_G)
    }

    pub fn read_accel_mg(&mut self) -> Result<Axes<i32>, Error<E>> {
        let sens = self.config.accel_scale.micro_g_per_lsb();
        Ok(self.read_accel_raw()?.map(|v| v as i32 * sens / 1000))
    }

    pub fn read_gyro_mdps(&mut self) -> Result<Axes<i32>, Error<E>> {
        let sens = self.config.gyro_scale.micro_dps_per_lsb();
        Ok(self.read_gyro_raw()?.map(|v| v as i32 * sens / 1000))
    }

    /// Die temperature in hundredths of a degree Celsius.
    pub fn read_temperature_centi(&mut self) -> Result<i32, Error<E>> {
        let raw = self.bus.read_u16_le(reg::OUT_TEMP_L)? as i16;
        Ok(raw as i32 * 100 / 256 + 2500)
    }

    fn read_axes(&mut self, first: u8) -> Result<Axes<i16>, Error<E>> {
        let mut buf = [0u8; 6];
        self.bus.read_regs(first, &mut buf)?;
        Ok(axes_from_le(&buf))
    }
}
