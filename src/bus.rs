/// Register framing over I2C.
///
/// Almost every I2C Click chip speaks the same dialect: write the register
/// address, then either write data bytes or repeat-start and read. This
/// wrapper owns the bus and the device address so drivers only deal with
/// their own register map.
use embedded_hal::i2c::I2c;

use crate::error::Error;

/// Longest burst accepted by [`RegisterBus::write_regs`].
pub const MAX_WRITE_LEN: usize = 32;

pub struct RegisterBus<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C, E> RegisterBus<I2C>
where
    I2C: I2c<Error = E>,
{
    pub const fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub(crate) fn set_address(&mut self, address: u8) {
        self.address = address;
    }

    /// Give the bus back to the caller.
    pub fn release(self) -> I2C {
        self.i2c
    }

    /// Write a bare command byte (no register, no data).
    pub fn write_command(&mut self, command: u8) -> Result<(), Error<E>> {
        self.i2c.write(self.address, &[command]).map_err(Error::Bus)
    }

    pub fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), Error<E>> {
        self.i2c.write(self.address, &[reg, value]).map_err(Error::Bus)
    }

    /// Write `data` to consecutive registers starting at `reg`.
    pub fn write_regs(&mut self, reg: u8, data: &[u8]) -> Result<(), Error<E>> {
        if data.len() > MAX_WRITE_LEN {
            return Err(Error::InvalidArgument);
        }
        let mut frame = [0u8; MAX_WRITE_LEN + 1];
        frame[0] = reg;
        frame[1..=data.len()].copy_from_slice(data);
        self.i2c
            .write(self.address, &frame[..=data.len()])
            .map_err(Error::Bus)
    }

    pub fn read_reg(&mut self, reg: u8) -> Result<u8, Error<E>> {
        let mut buf = [0u8; 1];
        self.read_regs(reg, &mut buf)?;
        Ok(buf[0])
    }

    pub fn read_regs(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Error<E>> {
        self.i2c
            .write_read(self.address, &[reg], buf)
            .map_err(Error::Bus)
    }

    /// Read-modify-write: clear `mask`, then set `bits & mask`.
    pub fn modify_reg(&mut self, reg: u8, mask: u8, bits: u8) -> Result<(), Error<E>> {
        let current = self.read_reg(reg)?;
        let next = (current & !mask) | (bits & mask);
        if next != current {
            self.write_reg(reg, next)?;
        }
        Ok(())
    }

    pub fn read_u16_be(&mut self, reg: u8) -> Result<u16, Error<E>> {
        let mut buf = [0u8; 2];
        self.read_regs(reg, &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    pub fn read_u16_le(&mut self, reg: u8) -> Result<u16, Error<E>> {
        let mut buf = [0u8; 2];
        self.read_regs(reg, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn write_u16_be(&mut self, reg: u8, value: u16) -> Result<(), Error<E>> {
        let [hi, lo] = value.to_be_bytes();
        self.i2c
            .write(self.address, &[reg, hi, lo])
            .map_err(Error::Bus)
    }

    // ── 16-bit register addresses (VL6180X and friends) ──────────────

    pub fn write_reg16(&mut self, reg: u16, value: u8) -> Result<(), Error<E>> {
        let [hi, lo] = reg.to_be_bytes();
        self.i2c
            .write(self.address, &[hi, lo, value])
            .map_err(Error::Bus)
    }

    pub fn read_reg16(&mut self, reg: u16) -> Result<u8, Error<E>> {
        let mut buf = [0u8; 1];
        self.read_regs16(reg, &mut buf)?;
        Ok(buf[0])
    }

    pub fn read_regs16(&mut self, reg: u16, buf: &mut [u8]) -> Result<(), Error<E>> {
        self.i2c
            .write_read(self.address, &reg.to_be_bytes(), buf)
            .map_err(Error::Bus)
    }
}
