//! Air quality 3 click: CCS811 eCO2/TVOC gas sensor over I2C.
//!
//! The chip boots into its bootloader; `init` validates the application
//! image and jumps to it. nWAKE must be held low for the chip to answer on
//! I2C, so the driver owns that line.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;

use crate::bus::RegisterBus;
use crate::error::Error;

/// ADDR pin low (Click default)
pub const ADDR_PRIMARY: u8 = 0x5A;
/// ADDR pin high
pub const ADDR_ALTERNATE: u8 = 0x5B;

pub const HW_ID_VALUE: u8 = 0x81;

#[allow(dead_code)]
mod reg {
    pub const STATUS: u8 = 0x00;
    pub const MEAS_MODE: u8 = 0x01;
    pub const ALG_RESULT_DATA: u8 = 0x02;
    pub const ENV_DATA: u8 = 0x05;
    pub const BASELINE: u8 = 0x11;
    pub const HW_ID: u8 = 0x20;
    pub const ERROR_ID: u8 = 0xE0;
    pub const APP_START: u8 = 0xF4;
    pub const SW_RESET: u8 = 0xFF;
}

const STATUS_ERROR: u8 = 0x01;
const STATUS_DATA_READY: u8 = 0x08;
const STATUS_APP_VALID: u8 = 0x10;
const STATUS_FW_MODE: u8 = 0x80;

const SW_RESET_SEQUENCE: [u8; 4] = [0x11, 0xE5, 0x72, 0x8A];

const WAKE_US: u32 = 50;
const APP_START_MS: u32 = 1;
const RESET_MS: u32 = 2;

/// MEAS_MODE.DRIVE_MODE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveMode {
    Idle = 0,
    #[default]
    Every1s = 1,
    Every10s = 2,
    Every60s = 3,
    /// Raw data only, no algorithm results
    Every250ms = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub address: u8,
    pub drive_mode: DriveMode,
    /// Assert nINT when new data is ready
    pub interrupt_on_data: bool,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            address: ADDR_PRIMARY,
            drive_mode: DriveMode::Every1s,
            interrupt_on_data: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Algorithm output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AirQuality {
    /// Equivalent CO2, 400..8192 ppm
    pub eco2_ppm: u16,
    /// Total volatile organic compounds, 0..1187 ppb
    pub tvoc_ppb: u16,
}

pub struct AirQualitySensor<I2C, WAKE> {
    bus: RegisterBus<I2C>,
    wake: WAKE,
    config: Config,
}

impl<I2C, WAKE, E> AirQualitySensor<I2C, WAKE>
where
    I2C: I2c<Error = E>,
    WAKE: OutputPin,
{
    pub fn new(i2c: I2C, wake: WAKE, config: Config) -> Self {
        Self {
            bus: RegisterBus::new(i2c, config.address),
            wake,
            config,
        }
    }

    pub fn release(self) -> (I2C, WAKE) {
        (self.bus.release(), self.wake)
    }

    /// Wake the chip, verify it, and start the application firmware.
    pub fn init<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        self.wake_up(delay)?;

        let id = self.bus.read_reg(reg::HW_ID)?;
        if id != HW_ID_VALUE {
            return Err(Error::UnexpectedId(id));
        }

        if self.bus.read_reg(reg::STATUS)? & STATUS_APP_VALID == 0 {
            log::warn!("CCS811: no valid application image");
            return Err(Error::Response);
        }

        self.bus.write_command(reg::APP_START)?;
        delay.delay_ms(APP_START_MS);

        if self.bus.read_reg(reg::STATUS)? & STATUS_FW_MODE == 0 {
            log::warn!("CCS811: still in boot mode after APP_START");
            return Err(Error::Response);
        }
        log::debug!("CCS811 application running");
        Ok(())
    }

    pub fn default_cfg(&mut self) -> Result<(), Error<E>> {
        let int = if self.config.interrupt_on_data { 0x08 } else { 0 };
        self.bus
            .write_reg(reg::MEAS_MODE, (self.config.drive_mode as u8) << 4 | int)
    }

    pub fn set_drive_mode(&mut self, mode: DriveMode) -> Result<(), Error<E>> {
        self.config.drive_mode = mode;
        self.default_cfg()
    }

    pub fn data_ready(&mut self) -> Result<bool, Error<E>> {
        Ok(self.bus.read_reg(reg::STATUS)? & STATUS_DATA_READY != 0)
    }

    /// Read eCO2 and TVOC. A set STATUS.ERROR surfaces as
    /// [`Error::Device`] carrying ERROR_ID.
    pub fn read_algorithm_results(&mut self) -> Result<AirQuality, Error<E>> {
        let mut buf = [0u8; 6];
        self.bus.read_regs(reg::ALG_RESULT_DATA, &mut buf)?;
        if buf[4] & STATUS_ERROR != 0 {
            return Err(Error::Device(buf[5]));
        }
        Ok(AirQuality {
            eco2_ppm: u16::from_be_bytes([buf[0], buf[1]]),
            tvoc_ppb: u16::from_be_bytes([buf[2], buf[3]]),
        })
    }

    pub fn error_id(&mut self) -> Result<u8, Error<E>> {
        self.bus.read_reg(reg::ERROR_ID)
    }

    /// Feed ambient humidity (milli-percent RH) and temperature
    /// (milli-degrees C) to the compensation algorithm.
    pub fn set_environment(&mut self, rh_milli: u32, temp_milli_c: i32) -> Result<(), Error<E>> {
        let hum = (rh_milli.min(100_000) * 512 / 1000) as u16;
        let temp = ((temp_milli_c as i64 + 25_000).max(0) * 512 / 1000).min(u16::MAX as i64) as u16;
        let [h_hi, h_lo] = hum.to_be_bytes();
        let [t_hi, t_lo] = temp.to_be_bytes();
        self.bus.write_regs(reg::ENV_DATA, &[h_hi, h_lo, t_hi, t_lo])
    }

    pub fn baseline(&mut self) -> Result<u16, Error<E>> {
        self.bus.read_u16_be(reg::BASELINE)
    }

    pub fn set_baseline(&mut self, baseline: u16) -> Result<(), Error<E>> {
        self.bus.write_u16_be(reg::BASELINE, baseline)
    }

    /// Back to boot mode; `init` must run again afterwards.
    pub fn software_reset<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        self.bus.write_regs(reg::SW_RESET, &SW_RESET_SEQUENCE)?;
        delay.delay_ms(RESET_MS);
        Ok(())
    }

    /// Release nWAKE; the chip stops answering on I2C but keeps measuring.
    pub fn sleep(&mut self) -> Result<(), Error<E>> {
        self.wake.set_high().map_err(|_| Error::Pin)
    }

    pub fn wake_up<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        self.wake.set_low().map_err(|_| Error::Pin)?;
        delay.delay_us(WAKE_US);
        Ok(())
    }
}
