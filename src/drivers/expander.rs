//! Expand 2 click: MCP23017 16-bit I/O expander over I2C.
//!
//! Runs in IOCON.BANK = 0 (power-on default): port A and B registers sit
//! next to each other, so a 16-bit access is one burst starting at the
//! port A register.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;

use crate::bus::RegisterBus;
use crate::error::Error;

/// A2..A0 strapped low
pub const ADDR_BASE: u8 = 0x20;

#[allow(dead_code)]
mod reg {
    pub const IODIRA: u8 = 0x00;
    pub const IPOLA: u8 = 0x02;
    pub const GPINTENA: u8 = 0x04;
    pub const DEFVALA: u8 = 0x06;
    pub const INTCONA: u8 = 0x08;
    pub const IOCON: u8 = 0x0A;
    pub const GPPUA: u8 = 0x0C;
    pub const INTFA: u8 = 0x0E;
    pub const INTCAPA: u8 = 0x10;
    pub const GPIOA: u8 = 0x12;
    pub const OLATA: u8 = 0x14;
}

const RESET_PULSE_US: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    A,
    B,
}

impl Port {
    // BANK = 0 interleaves A/B registers
    fn reg(self, base: u8) -> u8 {
        match self {
            Port::A => base,
            Port::B => base + 1,
        }
    }
}

/// Port and bit for a pin number: 0..8 on port A, 8..16 on port B.
fn split_pin(pin: u8) -> Option<(Port, u8)> {
    match pin {
        0..=7 => Some((Port::A, 1 << pin)),
        8..=15 => Some((Port::B, 1 << (pin - 8))),
        _ => None,
    }
}

/// Bit per pin, port A in the low byte. A set direction bit is an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub address: u8,
    pub direction: u16,
    pub pull_ups: u16,
    pub polarity: u16,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            address: ADDR_BASE,
            direction: 0xFFFF,
            pull_ups: 0,
            polarity: 0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Expander<I2C, RST> {
    bus: RegisterBus<I2C>,
    rst: RST,
    config: Config,
}

impl<I2C, RST, E> Expander<I2C, RST>
where
    I2C: I2c<Error = E>,
    RST: OutputPin,
{
    pub fn new(i2c: I2C, rst: RST, config: Config) -> Self {
        Self {
            bus: RegisterBus::new(i2c, config.address),
            rst,
            config,
        }
    }

    pub fn release(self) -> (I2C, RST) {
        (self.bus.release(), self.rst)
    }

    /// Pulse RST and check that IODIRA came back at its reset value.
    pub fn init<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        self.rst.set_low().map_err(|_| Error::Pin)?;
        delay.delay_us(RESET_PULSE_US);
        self.rst.set_high().map_err(|_| Error::Pin)?;
        delay.delay_us(RESET_PULSE_US);

        let iodir = self.bus.read_reg(reg::IODIRA)?;
        if iodir != 0xFF {
            log::warn!("MCP23017: IODIRA 0x{:02X} after reset", iodir);
            return Err(Error::UnexpectedId(iodir));
        }
        log::debug!("MCP23017 found at 0x{:02X}", self.bus.address());
        Ok(())
    }

    pub fn default_cfg(&mut self) -> Result<(), Error<E>> {
        let Config {
            direction,
            pull_ups,
            polarity,
            ..
        } = self.config;
        self.write_pair(reg::IODIRA, direction)?;
        self.write_pair(reg::GPPUA, pull_ups)?;
        self.write_pair(reg::IPOLA, polarity)
    }

    pub fn set_direction(&mut self, port: Port, inputs: u8) -> Result<(), Error<E>> {
        self.bus.write_reg(port.reg(reg::IODIRA), inputs)
    }

    pub fn set_pull_ups(&mut self, port: Port, enabled: u8) -> Result<(), Error<E>> {
        self.bus.write_reg(port.reg(reg::GPPUA), enabled)
    }

    pub fn set_polarity(&mut self, port: Port, inverted: u8) -> Result<(), Error<E>> {
        self.bus.write_reg(port.reg(reg::IPOLA), inverted)
    }

    pub fn read_port(&mut self, port: Port) -> Result<u8, Error<E>> {
        self.bus.read_reg(port.reg(reg::GPIOA))
    }

    /// Writes the output latch; pins configured as inputs ignore it.
    pub fn write_port(&mut self, port: Port, value: u8) -> Result<(), Error<E>> {
        self.bus.write_reg(port.reg(reg::OLATA), value)
    }

    pub fn read_all(&mut self) -> Result<u16, Error<E>> {
        self.read_pair(reg::GPIOA)
    }

    pub fn write_all(&mut self, value: u16) -> Result<(), Error<E>> {
        self.write_pair(reg::OLATA, value)
    }

    pub fn set_pin(&mut self, pin: u8, high: bool) -> Result<(), Error<E>> {
        let (port, mask) = split_pin(pin).ok_or(Error::InvalidArgument)?;
        let bits = if high { mask } else { 0 };
        self.bus.modify_reg(port.reg(reg::OLATA), mask, bits)
    }

    pub fn read_pin(&mut self, pin: u8) -> Result<bool, Error<E>> {
        let (port, mask) = split_pin(pin).ok_or(Error::InvalidArgument)?;
        Ok(self.read_port(port)? & mask != 0)
    }

    /// Interrupt on change for the pins set in `mask`, compared against the
    /// previous pin value. INTA/INTB are configured but never serviced here.
    pub fn enable_interrupts(&mut self, mask: u16) -> Result<(), Error<E>> {
        self.write_pair(reg::INTCONA, 0)?;
        self.write_pair(reg::GPINTENA, mask)
    }

    /// Which pins caused the pending interrupt.
    pub fn interrupt_flags(&mut self) -> Result<u16, Error<E>> {
        self.read_pair(reg::INTFA)
    }

    /// Port state latched at the interrupt; reading it clears the interrupt.
    pub fn interrupt_capture(&mut self) -> Result<u16, Error<E>> {
        self.read_pair(reg::INTCAPA)
    }

    fn read_pair(&mut self, base: u8) -> Result<u16, Error<E>> {
        self.bus.read_u16_le(base)
    }

    fn write_pair(&mut self, base: u8, value: u16) -> Result<(), Error<E>> {
        self.bus.write_regs(base, &value.to_le_bytes())
    }
}
