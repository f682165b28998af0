//! RN4871 click: Microchip RN4871 Bluetooth LE module over UART.
//!
//! The module speaks ASCII. In command mode every command ends with `\r`
//! and is answered by `AOK` or `Err` followed by a `CMD> ` prompt (which
//! has no line ending). Status events such as `%CONNECT,0,<addr>%` are
//! delimited by `%` and can show up at any time. In data mode bytes pass
//! through the Transparent UART service untouched.

use core::fmt::Write as _;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_io::{Read, ReadReady, Write};
use heapless::{String, Vec};

use crate::comm::LineReader;
use crate::error::Error;
use crate::protocol::MAX_MSG_LEN;

pub type Line = Vec<u8, MAX_MSG_LEN>;

/// GATT service bitmap for `SS`
pub mod service {
    pub const DEVICE_INFO: u8 = 0x80;
    pub const TRANSPARENT_UART: u8 = 0x40;
    pub const BEACON: u8 = 0x20;
}

pub const MAX_NAME_LEN: usize = 20;

const PROMPT: &[u8] = b"CMD> ";
const EVENT_LEN: usize = 32;

const RESET_MS: u32 = 5;
const POLL_MS: u32 = 10;
const RESPONSE_POLLS: u32 = 100;
const REBOOT_POLLS: u32 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Peer MAC address as 12 hex digits
    Connected(String<12>),
    Disconnected,
    StreamOpen,
    Reboot,
    /// Command mode prompt
    Prompt,
    Line(Line),
}

/// Splits the incoming byte stream into `%…%` status events, the command
/// prompt and plain lines.
pub struct EventScanner {
    lines: LineReader<MAX_MSG_LEN>,
    event: Vec<u8, EVENT_LEN>,
    in_event: bool,
}

impl EventScanner {
    pub const fn new() -> Self {
        Self {
            lines: LineReader::new(),
            event: Vec::new(),
            in_event: false,
        }
    }

    pub fn feed(&mut self, byte: u8) -> Option<Event> {
        if byte == b'%' {
            if self.in_event {
                self.in_event = false;
                return parse_event(&self.event);
            }
            self.in_event = true;
            self.event.clear();
            return None;
        }

        if self.in_event {
            // events never span lines or exceed EVENT_LEN
            if byte == b'\r' || byte == b'\n' || self.event.push(byte).is_err() {
                return self.replay(byte);
            }
            return None;
        }

        if let Some(line) = self.lines.feed(byte) {
            return Vec::from_slice(line).ok().map(Event::Line);
        }
        if self.lines.pending().ends_with(PROMPT) {
            self.lines.clear();
            return Some(Event::Prompt);
        }
        None
    }

    /// Hand a `%` run that turned out not to be an event back to the line
    /// reader, followed by `byte`.
    fn replay(&mut self, byte: u8) -> Option<Event> {
        self.in_event = false;
        let mut found = None;
        let run = core::iter::once(b'%')
            .chain(self.event.iter().copied())
            .chain(core::iter::once(byte));
        for b in run {
            if let Some(line) = self.lines.feed(b) {
                found = Vec::from_slice(line).ok().map(Event::Line);
            }
        }
        self.event.clear();
        found
    }
}

impl Default for EventScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_event(body: &[u8]) -> Option<Event> {
    match body {
        b"DISCONNECT" => Some(Event::Disconnected),
        b"STREAM_OPEN" => Some(Event::StreamOpen),
        b"REBOOT" => Some(Event::Reboot),
        _ if body.starts_with(b"CONNECT,") => {
            let addr = body.rsplit(|&b| b == b',').next()?;
            let addr = core::str::from_utf8(addr).ok()?;
            String::try_from(addr).ok().map(Event::Connected)
        }
        _ => {
            log::debug!("RN4871: unhandled event {:?}", core::str::from_utf8(body));
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Advertised device name
    pub name: &'static str,
    pub services: u8,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            name: "ClickDemo",
            services: service::DEVICE_INFO | service::TRANSPARENT_UART,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Bluetooth<UART, RST> {
    uart: UART,
    rst: RST,
    config: Config,
    scanner: EventScanner,
    /// Status event that arrived while a command was waiting.
    pending: Option<Event>,
}

impl<UART, RST, E> Bluetooth<UART, RST>
where
    UART: Read<Error = E> + ReadReady<Error = E> + Write<Error = E>,
    RST: OutputPin,
{
    pub fn new(uart: UART, rst: RST, config: Config) -> Self {
        Self {
            uart,
            rst,
            config,
            scanner: EventScanner::new(),
            pending: None,
        }
    }

    pub fn release(self) -> (UART, RST) {
        (self.uart, self.rst)
    }

    /// Pulse RST and wait for the module to announce `%REBOOT%`. A missing
    /// announcement is logged, not fatal; some firmware builds stay quiet.
    pub fn init<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        self.rst.set_low().map_err(|_| Error::Pin)?;
        delay.delay_ms(RESET_MS);
        self.rst.set_high().map_err(|_| Error::Pin)?;

        match self.wait_for_reboot(delay) {
            Ok(()) => log::debug!("RN4871 up"),
            Err(Error::Timeout) => log::warn!("RN4871: no reboot event after reset"),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Name and services from the config, then reboot so they take effect.
    pub fn default_cfg<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        self.enter_command_mode(delay)?;
        self.set_name(delay, self.config.name)?;
        self.set_services(delay, self.config.services)?;
        self.reboot(delay)
    }

    pub fn enter_command_mode<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        self.send(b"$$$")?;
        let mut budget = RESPONSE_POLLS;
        loop {
            match self.next_event(delay, &mut budget)? {
                Event::Prompt => return Ok(()),
                other => self.keep(other),
            }
        }
    }

    /// Send one command and wait for `AOK`.
    pub fn command<D: DelayNs>(&mut self, delay: &mut D, text: &str) -> Result<(), Error<E>> {
        self.send_line(text)?;
        let mut budget = RESPONSE_POLLS;
        loop {
            match self.next_event(delay, &mut budget)? {
                Event::Line(line) if line.as_slice() == b"AOK" => return Ok(()),
                Event::Line(line) if line.as_slice() == b"Err" => {
                    log::warn!("RN4871 rejected '{}'", text);
                    return Err(Error::Response);
                }
                Event::Line(_) | Event::Prompt => {}
                other => self.keep(other),
            }
        }
    }

    /// Send a command whose answer is a single line of text.
    pub fn query<D: DelayNs>(&mut self, delay: &mut D, text: &str) -> Result<Line, Error<E>> {
        self.send_line(text)?;
        let mut budget = RESPONSE_POLLS;
        loop {
            match self.next_event(delay, &mut budget)? {
                Event::Line(line) => return Ok(line),
                Event::Prompt => {}
                other => self.keep(other),
            }
        }
    }

    pub fn set_name<D: DelayNs>(&mut self, delay: &mut D, name: &str) -> Result<(), Error<E>> {
        if name.is_empty() || name.len() > MAX_NAME_LEN || name.contains(',') {
            return Err(Error::InvalidArgument);
        }
        let mut cmd: String<32> = String::new();
        write!(cmd, "SN,{}", name).map_err(|_| Error::InvalidArgument)?;
        self.command(delay, &cmd)
    }

    pub fn set_services<D: DelayNs>(&mut self, delay: &mut D, services: u8) -> Result<(), Error<E>> {
        let mut cmd: String<8> = String::new();
        write!(cmd, "SS,{:02X}", services).map_err(|_| Error::InvalidArgument)?;
        self.command(delay, &cmd)
    }

    /// Firmware version banner, e.g. `RN4871 V1.40 7/9/2019`.
    pub fn version<D: DelayNs>(&mut self, delay: &mut D) -> Result<Line, Error<E>> {
        self.query(delay, "V")
    }

    /// Reboot to apply settings. The module comes back in data mode.
    pub fn reboot<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        self.send_line("R,1")?;
        self.wait_for_reboot(delay)
    }

    pub fn exit_command_mode<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        self.send_line("---")?;
        let mut budget = RESPONSE_POLLS;
        loop {
            match self.next_event(delay, &mut budget)? {
                Event::Line(line) if line.as_slice() == b"END" => return Ok(()),
                Event::Line(_) | Event::Prompt => {}
                other => self.keep(other),
            }
        }
    }

    /// Raw bytes to the connected peer (data mode).
    pub fn write_data(&mut self, data: &[u8]) -> Result<(), Error<E>> {
        self.send(data)
    }

    /// Non-blocking: next status event or received line, if any.
    pub fn poll(&mut self) -> Result<Option<Event>, Error<E>> {
        if let Some(event) = self.pending.take() {
            return Ok(Some(event));
        }
        self.read_available()
    }

    fn wait_for_reboot<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        let mut budget = REBOOT_POLLS;
        loop {
            match self.next_event(delay, &mut budget)? {
                Event::Reboot => return Ok(()),
                Event::Line(_) | Event::Prompt => {}
                other => self.keep(other),
            }
        }
    }

    fn keep(&mut self, event: Event) {
        if self.pending.is_some() {
            log::debug!("RN4871: dropping older event");
        }
        self.pending = Some(event);
    }

    fn next_event<D: DelayNs>(&mut self, delay: &mut D, budget: &mut u32) -> Result<Event, Error<E>> {
        loop {
            if let Some(event) = self.read_available()? {
                return Ok(event);
            }
            if *budget == 0 {
                return Err(Error::Timeout);
            }
            *budget -= 1;
            delay.delay_ms(POLL_MS);
        }
    }

    fn read_available(&mut self) -> Result<Option<Event>, Error<E>> {
        let mut byte = [0u8; 1];
        while self.uart.read_ready().map_err(Error::Bus)? {
            if self.uart.read(&mut byte).map_err(Error::Bus)? == 0 {
                break;
            }
            if let Some(event) = self.scanner.feed(byte[0]) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    fn send_line(&mut self, text: &str) -> Result<(), Error<E>> {
        self.uart.write_all(text.as_bytes()).map_err(Error::Bus)?;
        self.send(b"\r")
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), Error<E>> {
        self.uart.write_all(bytes).map_err(Error::Bus)?;
        self.uart.flush().map_err(Error::Bus)
    }
}
