/// Driver error type shared by every Click driver.
///
/// `E` is the error of the underlying bus (I2C, SPI or UART). GPIO errors
/// are folded into [`Error::Pin`] because pin and bus error types differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// Error reported by the underlying bus.
    Bus(E),
    /// A GPIO line (reset, wake, select, chip enable) could not be driven or read.
    Pin,
    /// The identity register held an unexpected value.
    UnexpectedId(u8),
    /// The device reported an error code of its own.
    Device(u8),
    /// A status flag did not settle within the polling budget.
    Timeout,
    /// A received frame failed its checksum.
    Checksum,
    /// The device answered with something other than what the command expects.
    Response,
    /// A response did not fit into the receive buffer.
    Overflow,
    /// An argument is outside the range the device accepts.
    InvalidArgument,
}

impl<E> Error<E> {
    /// True when the error came from the bus rather than from the device.
    pub fn is_bus(&self) -> bool {
        matches!(self, Error::Bus(_))
    }
}

impl<E: core::fmt::Debug> core::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Bus(e) => write!(f, "bus error: {:?}", e),
            Error::Pin => f.write_str("gpio error"),
            Error::UnexpectedId(id) => write!(f, "unexpected device id 0x{:02X}", id),
            Error::Device(code) => write!(f, "device error code 0x{:02X}", code),
            Error::Timeout => f.write_str("timed out waiting for device"),
            Error::Checksum => f.write_str("checksum mismatch"),
            Error::Response => f.write_str("unexpected response"),
            Error::Overflow => f.write_str("response too long"),
            Error::InvalidArgument => f.write_str("argument out of range"),
        }
    }
}
