//! UART MUX click: routes one MCU UART to one of four channels through an
//! analog multiplexer. A and B pick the channel; INH (active high)
//! disconnects all of them.

use embedded_hal::digital::OutputPin;
use embedded_io::{Read, ReadReady, Write};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Channel {
    #[default]
    Ch1,
    Ch2,
    Ch3,
    Ch4,
}

impl Channel {
    /// Levels for the (A, B) select pins.
    fn select_bits(self) -> (bool, bool) {
        match self {
            Channel::Ch1 => (false, false),
            Channel::Ch2 => (true, false),
            Channel::Ch3 => (false, true),
            Channel::Ch4 => (true, true),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub channel: Channel,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            channel: Channel::Ch1,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

pub struct UartMux<UART, A, B, INH> {
    uart: UART,
    a: A,
    b: B,
    inh: INH,
    config: Config,
    /// `None` until the select pins have been driven.
    selected: Option<Channel>,
    enabled: bool,
}

impl<UART, A, B, INH, E> UartMux<UART, A, B, INH>
where
    UART: Read<Error = E> + ReadReady<Error = E> + Write<Error = E>,
    A: OutputPin,
    B: OutputPin,
    INH: OutputPin,
{
    pub fn new(uart: UART, a: A, b: B, inh: INH, config: Config) -> Self {
        Self {
            uart,
            a,
            b,
            inh,
            config,
            selected: None,
            enabled: false,
        }
    }

    pub fn release(self) -> (UART, A, B, INH) {
        (self.uart, self.a, self.b, self.inh)
    }

    /// Start disconnected.
    pub fn init(&mut self) -> Result<(), Error<E>> {
        self.disable()
    }

    pub fn default_cfg(&mut self) -> Result<(), Error<E>> {
        self.select(self.config.channel)?;
        self.enable()
    }

    pub fn select(&mut self, channel: Channel) -> Result<(), Error<E>> {
        let (a, b) = channel.select_bits();
        self.a.set_state(a.into()).map_err(|_| Error::Pin)?;
        self.b.set_state(b.into()).map_err(|_| Error::Pin)?;
        self.selected = Some(channel);
        log::debug!("UART MUX -> {:?}", channel);
        Ok(())
    }

    pub fn enable(&mut self) -> Result<(), Error<E>> {
        self.inh.set_low().map_err(|_| Error::Pin)?;
        self.enabled = true;
        Ok(())
    }

    pub fn disable(&mut self) -> Result<(), Error<E>> {
        self.inh.set_high().map_err(|_| Error::Pin)?;
        self.enabled = false;
        Ok(())
    }

    pub fn selected(&self) -> Option<Channel> {
        self.selected
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Write to the selected channel.
    pub fn write(&mut self, data: &[u8]) -> Result<(), Error<E>> {
        self.uart.write_all(data).map_err(Error::Bus)?;
        self.uart.flush().map_err(Error::Bus)
    }

    /// Switch to `channel`, connect it and send.
    pub fn write_to(&mut self, channel: Channel, data: &[u8]) -> Result<(), Error<E>> {
        if self.selected != Some(channel) {
            self.select(channel)?;
        }
        if !self.enabled {
            self.enable()?;
        }
        self.write(data)
    }

    /// Non-blocking read from the selected channel; 0 when nothing waits.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error<E>> {
        if !self.uart.read_ready().map_err(Error::Bus)? {
            return Ok(0);
        }
        self.uart.read(buf).map_err(Error::Bus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeUart;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction as PinTx};

    #[test]
    fn init_inhibits() {
        let mut uart = FakeUart::new();
        let mut a = PinMock::new(&[]);
        let mut b = PinMock::new(&[]);
        let mut inh = PinMock::new(&[PinTx::set(State::High)]);
        let mut mux = UartMux::new(&mut uart, a.clone(), b.clone(), inh.clone(), Config::new());
        mux.init().unwrap();
        assert!(!mux.is_enabled());
        drop(mux);
        a.done();
        b.done();
        inh.done();
    }

    #[test]
    fn default_cfg_selects_and_enables() {
        let mut uart = FakeUart::new();
        let mut a = PinMock::new(&[PinTx::set(State::Low)]);
        let mut b = PinMock::new(&[PinTx::set(State::High)]);
        let mut inh = PinMock::new(&[PinTx::set(State::Low)]);
        let config = Config {
            channel: Channel::Ch3,
        };
        let mut mux = UartMux::new(&mut uart, a.clone(), b.clone(), inh.clone(), config);
        mux.default_cfg().unwrap();
        assert_eq!(mux.selected(), Some(Channel::Ch3));
        assert!(mux.is_enabled());
        drop(mux);
        a.done();
        b.done();
        inh.done();
    }

    #[test]
    fn write_to_switches_only_when_needed() {
        let mut uart = FakeUart::new();
        let mut a = PinMock::new(&[PinTx::set(State::High)]);
        let mut b = PinMock::new(&[PinTx::set(State::High)]);
        let mut inh = PinMock::new(&[PinTx::set(State::Low)]);
        let mut mux = UartMux::new(&mut uart, a.clone(), b.clone(), inh.clone(), Config::new());
        mux.write_to(Channel::Ch4, b"AT\r").unwrap();
        mux.write_to(Channel::Ch4, b"AT+GMR\r").unwrap();
        assert_eq!(mux.selected(), Some(Channel::Ch4));
        drop(mux);
        a.done();
        b.done();
        inh.done();
        assert_eq!(uart.take_tx(), b"AT\rAT+GMR\r".to_vec());
    }

    #[test]
    fn first_write_drives_select_pins_for_configured_channel() {
        let mut uart = FakeUart::new();
        let mut a = PinMock::new(&[PinTx::set(State::Low)]);
        let mut b = PinMock::new(&[PinTx::set(State::Low)]);
        let mut inh = PinMock::new(&[PinTx::set(State::High), PinTx::set(State::Low)]);
        let mut mux = UartMux::new(&mut uart, a.clone(), b.clone(), inh.clone(), Config::new());
        mux.init().unwrap();
        assert_eq!(mux.selected(), None);
        mux.write_to(Channel::Ch1, b"AT\r").unwrap();
        assert_eq!(mux.selected(), Some(Channel::Ch1));
        drop(mux);
        a.done();
        b.done();
        inh.done();
        assert_eq!(uart.take_tx(), b"AT\r".to_vec());
    }

    #[test]
    fn read_is_non_blocking() {
        let mut uart = FakeUart::new();
        let mut a = PinMock::new(&[]);
        let mut b = PinMock::new(&[]);
        let mut inh = PinMock::new(&[]);
        let mut mux = UartMux::new(&mut uart, a.clone(), b.clone(), inh.clone(), Config::new());
        let mut buf = [0u8; 8];
        assert_eq!(mux.read(&mut buf).unwrap(), 0);
        drop(mux);

        uart.reply(b"OK\r\n");
        let mut mux = UartMux::new(&mut uart, a.clone(), b.clone(), inh.clone(), Config::new());
        assert_eq!(mux.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"OK\r\n");
        drop(mux);
        a.done();
        b.done();
        inh.done();
    }
}
