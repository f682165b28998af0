/// Host communication: NDJSON serialization, command parsing and the
/// line framing shared by the ASCII-speaking UART Click modules.
///
/// The firmware streams readings as newline-delimited JSON and accepts
/// commands in the same format, either over serial or through the
/// Bluetooth click's transparent UART.
use serde::Serialize;

use crate::protocol::{HostCommand, RawCommand, ScaleRequest, MAX_MSG_LEN};

/// Serial baud rate shared by the console and the UART Click modules
pub const SERIAL_BAUD: u32 = 115200;

/// Default polling period
pub const DEFAULT_INTERVAL_MS: u32 = 1000;

/// Bounds for host-requested polling periods
pub const MIN_INTERVAL_MS: u32 = 50;
pub const MAX_INTERVAL_MS: u32 = 60_000;

/// Runtime polling configuration. Lets a host pause the loop or change the
/// rate without reflashing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PollConfig {
    /// Whether the polling loop reads sensors at all
    pub enabled: bool,
    /// Time between polling rounds
    pub interval_ms: u32,
}

impl PollConfig {
    pub const fn new() -> Self {
        Self {
            enabled: true,
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── Serialization helpers ──────────────────────────────────────────────

/// Serialize a message to JSON bytes and write to the output buffer.
/// Returns the number of bytes written, or None if serialization failed.
pub fn serialize_message<T: Serialize>(msg: &T, buf: &mut [u8]) -> Option<usize> {
    match serde_json_core::to_slice(msg, buf) {
        Ok(len) => {
            // Append newline for NDJSON
            if len < buf.len() {
                buf[len] = b'\n';
                Some(len + 1)
            } else {
                Some(len)
            }
        }
        Err(_) => None,
    }
}

/// Deserialize a HostCommand from a JSON byte slice.
pub fn parse_command(data: &[u8]) -> Option<HostCommand> {
    let trimmed = trim_trailing_whitespace(data);
    if trimmed.is_empty() {
        return None;
    }
    let (raw, _) = serde_json_core::from_slice::<RawCommand>(trimmed).ok()?;
    match raw.cmd.as_str() {
        "start" => Some(HostCommand::Start),
        "stop" => Some(HostCommand::Stop),
        "status" => Some(HostCommand::GetStatus),
        "interval" => raw.ms.map(|ms| HostCommand::SetInterval { ms }),
        "tare" => Some(HostCommand::Tare),
        "calibrate" => raw.grams.map(|grams| HostCommand::Calibrate { grams }),
        other => {
            log::warn!("Unknown host command '{}'", other);
            None
        }
    }
}

/// Process a received host command and update polling state accordingly.
///
/// Load-cell commands cannot be served here (the HX711 belongs to the
/// polling loop), so they are handed back as a [`ScaleRequest`].
pub fn handle_command(cmd: &HostCommand, config: &mut PollConfig) -> Option<ScaleRequest> {
    match *cmd {
        HostCommand::Start => {
            config.enabled = true;
            log::info!("Polling started by host command");
            None
        }
        HostCommand::Stop => {
            config.enabled = false;
            log::info!("Polling stopped by host command");
            None
        }
        HostCommand::GetStatus => {
            // Status message is built by the caller, which knows uptime and board state
            None
        }
        HostCommand::SetInterval { ms } => {
            config.interval_ms = ms.clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS);
            log::info!("Polling interval set to {} ms", config.interval_ms);
            None
        }
        HostCommand::Tare => Some(ScaleRequest::Tare),
        HostCommand::Calibrate { grams } => Some(ScaleRequest::Calibrate { grams }),
    }
}

// ── Line reader ────────────────────────────────────────────────────────

/// Line accumulator for ASCII serial protocols.
/// Collects bytes until `\r` or `\n`, then yields the line.
pub struct LineReader<const N: usize = MAX_MSG_LEN> {
    buf: [u8; N],
    pos: usize,
}

impl<const N: usize> LineReader<N> {
    pub const fn new() -> Self {
        Self { buf: [0; N], pos: 0 }
    }

    /// Feed a byte into the reader. Returns a complete line (without newline)
    /// when one is detected.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        if byte == b'\n' || byte == b'\r' {
            if self.pos > 0 {
                let line = &self.buf[..self.pos];
                self.pos = 0;
                Some(line)
            } else {
                None
            }
        } else if self.pos < self.buf.len() {
            self.buf[self.pos] = byte;
            self.pos += 1;
            None
        } else {
            // Overflow: discard and reset
            self.pos = 0;
            None
        }
    }

    /// Bytes accumulated since the last delimiter.
    pub fn pending(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    pub fn clear(&mut self) {
        self.pos = 0;
    }
}

impl<const N: usize> Default for LineReader<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Display formatting ────────────────────────────────────────────────

/// Milligrams as grams with one decimal (`-0.5g`, `12.3g`). The sign is
/// written separately so weights under one gram keep it.
pub fn write_grams<W: core::fmt::Write>(out: &mut W, mg: i32) -> core::fmt::Result {
    let sign = if mg < 0 { "-" } else { "" };
    let abs = mg.unsigned_abs();
    write!(out, "{}{}.{}g", sign, abs / 1000, abs % 1000 / 100)
}

fn trim_trailing_whitespace(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    while end > 0 && matches!(data[end - 1], b' ' | b'\n' | b'\r' | b'\t') {
        end -= 1;
    }
    &data[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Reading;

    // ── write_grams ─────────────────────────────────────────────────

    fn grams(mg: i32) -> heapless::String<16> {
        let mut s = heapless::String::new();
        write_grams(&mut s, mg).unwrap();
        s
    }

    #[test]
    fn grams_keep_sign_below_one_gram() {
        assert_eq!(grams(-500), "-0.5g");
        assert_eq!(grams(-1), "-0.0g");
        assert_eq!(grams(-12_345), "-12.3g");
    }

    #[test]
    fn grams_format_positive_and_extremes() {
        assert_eq!(grams(0), "0.0g");
        assert_eq!(grams(12_345), "12.3g");
        assert_eq!(grams(i32::MIN), "-2147483.6g");
    }

    // ── parse_command ───────────────────────────────────────────────

    #[test]
    fn parse_simple_commands() {
        assert_eq!(parse_command(br#"{"cmd":"start"}"#), Some(HostCommand::Start));
        assert_eq!(parse_command(br#"{"cmd":"stop"}"#), Some(HostCommand::Stop));
        assert_eq!(parse_command(br#"{"cmd":"status"}"#), Some(HostCommand::GetStatus));
        assert_eq!(parse_command(br#"{"cmd":"tare"}"#), Some(HostCommand::Tare));
    }

    #[test]
    fn parse_commands_with_arguments() {
        assert_eq!(
            parse_command(br#"{"cmd":"interval","ms":250}"#),
            Some(HostCommand::SetInterval { ms: 250 })
        );
        assert_eq!(
            parse_command(br#"{"cmd":"calibrate","grams":500}"#),
            Some(HostCommand::Calibrate { grams: 500 })
        );
    }

    #[test]
    fn parse_rejects_missing_argument() {
        assert_eq!(parse_command(br#"{"cmd":"interval"}"#), None);
        assert_eq!(parse_command(br#"{"cmd":"calibrate"}"#), None);
    }

    #[test]
    fn parse_strips_trailing_newline() {
        assert_eq!(parse_command(b"{\"cmd\":\"stop\"}\r\n"), Some(HostCommand::Stop));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_command(b""), None);
        assert_eq!(parse_command(b"   \n"), None);
        assert_eq!(parse_command(b"not json"), None);
        assert_eq!(parse_command(br#"{"cmd":"selfdestruct"}"#), None);
    }

    // ── handle_command ──────────────────────────────────────────────

    #[test]
    fn start_stop_toggle_polling() {
        let mut config = PollConfig::new();
        assert!(handle_command(&HostCommand::Stop, &mut config).is_none());
        assert!(!config.enabled);
        assert!(handle_command(&HostCommand::Start, &mut config).is_none());
        assert!(config.enabled);
    }

    #[test]
    fn interval_is_clamped() {
        let mut config = PollConfig::new();
        handle_command(&HostCommand::SetInterval { ms: 1 }, &mut config);
        assert_eq!(config.interval_ms, MIN_INTERVAL_MS);
        handle_command(&HostCommand::SetInterval { ms: u32::MAX }, &mut config);
        assert_eq!(config.interval_ms, MAX_INTERVAL_MS);
        handle_command(&HostCommand::SetInterval { ms: 250 }, &mut config);
        assert_eq!(config.interval_ms, 250);
    }

    #[test]
    fn scale_commands_are_forwarded() {
        let mut config = PollConfig::new();
        assert_eq!(
            handle_command(&HostCommand::Tare, &mut config),
            Some(ScaleRequest::Tare)
        );
        assert_eq!(
            handle_command(&HostCommand::Calibrate { grams: 200 }, &mut config),
            Some(ScaleRequest::Calibrate { grams: 200 })
        );
        assert_eq!(config, PollConfig::new());
    }

    // ── serialize_message ───────────────────────────────────────────

    #[test]
    fn serialize_appends_newline() {
        let msg = Reading::Range { mm: 42, ts: 9 };
        let mut buf = [0u8; 64];
        let len = serialize_message(&msg, &mut buf).unwrap();
        assert_eq!(&buf[..len], b"{\"type\":\"range\",\"mm\":42,\"ts\":9}\n");
    }

    #[test]
    fn serialize_fails_when_buffer_too_small() {
        let msg = Reading::Range { mm: 42, ts: 9 };
        let mut buf = [0u8; 8];
        assert_eq!(serialize_message(&msg, &mut buf), None);
    }

    // ── LineReader ──────────────────────────────────────────────────

    #[test]
    fn line_reader_yields_lines() {
        let mut reader = LineReader::<16>::new();
        let mut lines = 0;
        for &b in b"AOK\r\nErr\r\n" {
            if let Some(line) = reader.feed(b) {
                assert!(line == b"AOK" || line == b"Err");
                lines += 1;
            }
        }
        assert_eq!(lines, 2);
    }

    #[test]
    fn line_reader_ignores_empty_lines() {
        let mut reader = LineReader::<16>::new();
        assert!(reader.feed(b'\n').is_none());
        assert!(reader.feed(b'\r').is_none());
    }

    #[test]
    fn line_reader_discards_on_overflow() {
        let mut reader = LineReader::<4>::new();
        for &b in b"abcd" {
            assert!(reader.feed(b).is_none());
        }
        // Fifth byte overflows and drops the partial line
        assert!(reader.feed(b'e').is_none());
        assert!(reader.pending().is_empty());
        for &b in b"ok" {
            reader.feed(b);
        }
        assert_eq!(reader.feed(b'\n'), Some(&b"ok"[..]));
    }
}
