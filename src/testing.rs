//! Host-side fakes shared by the driver tests.

use std::collections::VecDeque;
use std::vec::Vec;

use core::convert::Infallible;

/// In-memory UART: bytes queued with [`FakeUart::reply`] are served to the
/// driver, everything the driver writes lands in `tx`.
#[derive(Default)]
pub struct FakeUart {
    pub rx: VecDeque<u8>,
    pub tx: Vec<u8>,
}

impl FakeUart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    pub fn take_tx(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.tx)
    }
}

impl embedded_io::ErrorType for FakeUart {
    type Error = Infallible;
}

impl embedded_io::Read for FakeUart {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut n = 0;
        while n < buf.len() {
            match self.rx.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl embedded_io::ReadReady for FakeUart {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.rx.is_empty())
    }
}

impl embedded_io::Write for FakeUart {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.tx.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
