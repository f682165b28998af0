//! LR click: LoRa modem module driven over UART with a binary framing.
//!
//! Every message in either direction is one frame:
//!
//! ```text
//! 0xAA | cmd | len | payload (len ≤ 64) | checksum
//! ```
//!
//! The checksum is the two's complement of the 8-bit sum of `cmd`, `len`
//! and the payload, so all bytes after the start byte add up to zero.
//! The module answers each command with `cmd | 0x80` and a status byte as
//! the first payload byte. Received packets arrive unsolicited as
//! [`IND_RECEIVED`] frames.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_io::{Read, ReadReady, Write};
use heapless::Vec;

use crate::error::Error;

pub const START_BYTE: u8 = 0xAA;
pub const MAX_PAYLOAD: usize = 64;
/// Start, cmd, len, payload and checksum
pub const MAX_FRAME_LEN: usize = MAX_PAYLOAD + 4;

pub const RESPONSE_FLAG: u8 = 0x80;

pub const CMD_VERSION: u8 = 0x01;
pub const CMD_RADIO_CONFIG: u8 = 0x10;
pub const CMD_TRANSMIT: u8 = 0x20;
pub const CMD_RECEIVE: u8 = 0x21;
pub const CMD_SLEEP: u8 = 0x30;
pub const CMD_FACTORY_RESET: u8 = 0x3F;
/// Unsolicited: rssi (i16 BE), snr (i8), data
pub const IND_RECEIVED: u8 = 0x40;

const RESET_MS: u32 = 10;
const BOOT_MS: u32 = 100;
const RESPONSE_POLLS: u32 = 100;
const RESPONSE_POLL_MS: u32 = 10;

// ── Frame codec ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub cmd: u8,
    pub payload: Vec<u8, MAX_PAYLOAD>,
}

impl Frame {
    pub fn is_response_to(&self, cmd: u8) -> bool {
        self.cmd == cmd | RESPONSE_FLAG
    }

    /// Status byte of a response frame.
    pub fn status(&self) -> Option<u8> {
        self.payload.first().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Length byte above [`MAX_PAYLOAD`], or output buffer too small
    Oversize,
    Checksum,
}

pub fn checksum(cmd: u8, payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(cmd.wrapping_add(payload.len() as u8), |sum, &b| sum.wrapping_add(b))
        .wrapping_neg()
}

/// Encode one frame into `out`, returning its length.
pub fn encode_frame(cmd: u8, payload: &[u8], out: &mut [u8]) -> Result<usize, FrameError> {
    let len = payload.len() + 4;
    if payload.len() > MAX_PAYLOAD || out.len() < len {
        return Err(FrameError::Oversize);
    }
    out[0] = START_BYTE;
    out[1] = cmd;
    out[2] = payload.len() as u8;
    out[3..3 + payload.len()].copy_from_slice(payload);
    out[len - 1] = checksum(cmd, payload);
    Ok(len)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Start,
    Cmd,
    Len,
    Payload,
    Checksum,
}

/// Byte-at-a-time frame parser. Bytes outside a frame are skipped until
/// the next start byte; a bad length or checksum drops the frame and
/// resynchronizes.
pub struct FrameDecoder {
    state: DecodeState,
    cmd: u8,
    len: usize,
    payload: Vec<u8, MAX_PAYLOAD>,
}

impl FrameDecoder {
    pub const fn new() -> Self {
        Self {
            state: DecodeState::Start,
            cmd: 0,
            len: 0,
            payload: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.state = DecodeState::Start;
        self.payload.clear();
    }

    pub fn feed(&mut self, byte: u8) -> Option<Result<Frame, FrameError>> {
        match self.state {
            DecodeState::Start => {
                if byte == START_BYTE {
                    self.payload.clear();
                    self.state = DecodeState::Cmd;
                }
                None
            }
            DecodeState::Cmd => {
                self.cmd = byte;
                self.state = DecodeState::Len;
                None
            }
            DecodeState::Len => {
                self.len = byte as usize;
                if self.len > MAX_PAYLOAD {
                    self.reset();
                    return Some(Err(FrameError::Oversize));
                }
                self.state = if self.len == 0 {
                    DecodeState::Checksum
                } else {
                    DecodeState::Payload
                };
                None
            }
            DecodeState::Payload => {
                // len is bounded above, push cannot fail
                let _ = self.payload.push(byte);
                if self.payload.len() == self.len {
                    self.state = DecodeState::Checksum;
                }
                None
            }
            DecodeState::Checksum => {
                self.state = DecodeState::Start;
                if byte != checksum(self.cmd, &self.payload) {
                    self.payload.clear();
                    return Some(Err(FrameError::Checksum));
                }
                Some(Ok(Frame {
                    cmd: self.cmd,
                    payload: core::mem::take(&mut self.payload),
                }))
            }
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

// ── Driver ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bandwidth {
    #[default]
    Khz125 = 0,
    Khz250 = 1,
    Khz500 = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub frequency_hz: u32,
    /// SF7..SF12
    pub spreading_factor: u8,
    pub bandwidth: Bandwidth,
    pub tx_power_dbm: i8,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            frequency_hz: 868_100_000,
            spreading_factor: 7,
            bandwidth: Bandwidth::Khz125,
            tx_power_dbm: 14,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

/// A packet heard by the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub rssi_dbm: i16,
    pub snr_db: i8,
    pub data: Vec<u8, MAX_PAYLOAD>,
}

impl Received {
    fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < 3 {
            return None;
        }
        Some(Self {
            rssi_dbm: i16::from_be_bytes([payload[0], payload[1]]),
            snr_db: payload[2] as i8,
            data: Vec::from_slice(&payload[3..]).ok()?,
        })
    }
}

pub struct Lora<UART, RST> {
    uart: UART,
    rst: RST,
    config: Config,
    decoder: FrameDecoder,
    /// Packet that arrived while a command was waiting for its response.
    pending: Option<Received>,
}

impl<UART, RST, E> Lora<UART, RST>
where
    UART: Read<Error = E> + ReadReady<Error = E> + Write<Error = E>,
    RST: OutputPin,
{
    pub fn new(uart: UART, rst: RST, config: Config) -> Self {
        Self {
            uart,
            rst,
            config,
            decoder: FrameDecoder::new(),
            pending: None,
        }
    }

    pub fn release(self) -> (UART, RST) {
        (self.uart, self.rst)
    }

    /// Reset the module and ask for the version. Boot chatter is skipped
    /// by the decoder since it carries no start byte.
    pub fn init<D: DelayNs>(&mut self, delay: &mut D) -> Result<Version, Error<E>> {
        self.rst.set_low().map_err(|_| Error::Pin)?;
        delay.delay_ms(RESET_MS);
        self.rst.set_high().map_err(|_| Error::Pin)?;
        delay.delay_ms(BOOT_MS);

        self.decoder.reset();
        self.pending = None;
        let version = self.version(delay)?;
        log::debug!(
            "LoRa module firmware {}.{}.{}",
            version.major,
            version.minor,
            version.patch
        );
        Ok(version)
    }

    pub fn version<D: DelayNs>(&mut self, delay: &mut D) -> Result<Version, Error<E>> {
        let frame = self.request(delay, CMD_VERSION, &[])?;
        match frame.payload.as_slice() {
            [_, major, minor, patch, ..] => Ok(Version {
                major: *major,
                minor: *minor,
                patch: *patch,
            }),
            _ => Err(Error::Response),
        }
    }

    pub fn default_cfg<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        let c = self.config;
        if !(7..=12).contains(&c.spreading_factor) {
            return Err(Error::InvalidArgument);
        }
        let [f0, f1, f2, f3] = c.frequency_hz.to_be_bytes();
        let payload = [
            f0,
            f1,
            f2,
            f3,
            c.spreading_factor,
            c.bandwidth as u8,
            c.tx_power_dbm as u8,
        ];
        self.request(delay, CMD_RADIO_CONFIG, &payload).map(|_| ())
    }

    pub fn transmit<D: DelayNs>(&mut self, delay: &mut D, data: &[u8]) -> Result<(), Error<E>> {
        if data.is_empty() || data.len() > MAX_PAYLOAD {
            return Err(Error::InvalidArgument);
        }
        self.request(delay, CMD_TRANSMIT, data).map(|_| ())
    }

    /// Listen for packets; zero keeps the receiver on until the next
    /// command.
    pub fn start_receive<D: DelayNs>(&mut self, delay: &mut D, timeout_ms: u16) -> Result<(), Error<E>> {
        self.request(delay, CMD_RECEIVE, &timeout_ms.to_be_bytes())
            .map(|_| ())
    }

    /// Non-blocking check for a received packet.
    pub fn poll_received(&mut self) -> Result<Option<Received>, Error<E>> {
        if let Some(packet) = self.pending.take() {
            return Ok(Some(packet));
        }
        while let Some(frame) = self.read_frame()? {
            if frame.cmd == IND_RECEIVED {
                return Received::parse(&frame.payload)
                    .map(Some)
                    .ok_or(Error::Response);
            }
            log::debug!("LoRa: ignoring frame 0x{:02X}", frame.cmd);
        }
        Ok(None)
    }

    pub fn sleep<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        self.request(delay, CMD_SLEEP, &[]).map(|_| ())
    }

    /// Restore the module's stored defaults; radio settings must be sent
    /// again afterwards.
    pub fn factory_reset<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        self.request(delay, CMD_FACTORY_RESET, &[]).map(|_| ())
    }

    /// Send a command and wait for its response. A non-zero status byte
    /// becomes [`Error::Device`].
    fn request<D: DelayNs>(&mut self, delay: &mut D, cmd: u8, payload: &[u8]) -> Result<Frame, Error<E>> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = encode_frame(cmd, payload, &mut buf).map_err(|_| Error::InvalidArgument)?;
        self.uart.write_all(&buf[..len]).map_err(Error::Bus)?;
        self.uart.flush().map_err(Error::Bus)?;

        for _ in 0..RESPONSE_POLLS {
            while let Some(frame) = self.read_frame()? {
                if frame.is_response_to(cmd) {
                    return match frame.status() {
                        Some(0) => Ok(frame),
                        Some(status) => {
                            log::warn!("LoRa: command 0x{:02X} failed, status {}", cmd, status);
                            Err(Error::Device(status))
                        }
                        None => Err(Error::Response),
                    };
                }
                self.stash(frame);
            }
            delay.delay_ms(RESPONSE_POLL_MS);
        }
        log::warn!("LoRa: no response to 0x{:02X}", cmd);
        Err(Error::Timeout)
    }

    fn stash(&mut self, frame: Frame) {
        if frame.cmd != IND_RECEIVED {
            log::debug!("LoRa: unexpected frame 0x{:02X}", frame.cmd);
            return;
        }
        if self.pending.is_some() {
            log::warn!("LoRa: dropping older received packet");
        }
        self.pending = Received::parse(&frame.payload);
    }

    /// Feed whatever bytes are available to the decoder until one frame
    /// completes.
    fn read_frame(&mut self) -> Result<Option<Frame>, Error<E>> {
        let mut byte = [0u8; 1];
        while self.uart.read_ready().map_err(Error::Bus)? {
            if self.uart.read(&mut byte).map_err(Error::Bus)? == 0 {
                break;
            }
            match self.decoder.feed(byte[0]) {
                Some(Ok(frame)) => return Ok(Some(frame)),
                Some(Err(FrameError::Checksum)) => return Err(Error::Checksum),
                Some(Err(FrameError::Oversize)) => return Err(Error::Overflow),
                None => {}
            }
        }
        Ok(None)
    }
}
