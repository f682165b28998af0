/// JSON message protocol between the demo firmware and a host.
///
/// All messages are newline-delimited JSON (NDJSON).
/// Uses `heapless` types for no_std/no-alloc operation; physical values are
/// carried as integers in milli-units so no float formatting is needed.
use heapless::Vec;
use serde::{Deserialize, Serialize};

/// One sensor reading, tagged by the Click board that produced it.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum Reading<'a> {
    /// Accel click (ADXL345)
    #[serde(rename = "accel")]
    Accel {
        x_mg: i32,
        y_mg: i32,
        z_mg: i32,
        /// Uptime in milliseconds when captured
        ts: u32,
    },
    /// 6DOF IMU click (LSM6DSL)
    #[serde(rename = "imu")]
    Imu {
        accel_mg: [i32; 3],
        gyro_mdps: [i32; 3],
        /// Die temperature in hundredths of a degree Celsius
        temp_c100: i32,
        ts: u32,
    },
    /// Air quality 3 click (CCS811)
    #[serde(rename = "air")]
    AirQuality { eco2_ppm: u16, tvoc_ppb: u16, ts: u32 },
    /// Fuel Gauge click (MAX17043)
    #[serde(rename = "battery")]
    Battery {
        mv: u16,
        /// State of charge in hundredths of a percent
        soc_c100: u16,
        alert: bool,
        ts: u32,
    },
    /// IR Gesture click (APDS-9960)
    #[serde(rename = "gesture")]
    Gesture {
        /// "up", "down", "left" or "right"
        dir: &'static str,
        ts: u32,
    },
    /// LightRanger click (VL6180X)
    #[serde(rename = "range")]
    Range { mm: u8, ts: u32 },
    /// Load Cell click (HX711)
    #[serde(rename = "weight")]
    Weight {
        /// Weight in milligrams
        mg: i32,
        raw: i32,
        ts: u32,
    },
    /// Spectral click (AS7262), raw counts for V, B, G, Y, O, R
    #[serde(rename = "spectrum")]
    Spectrum { raw: &'a [u16; 6], ts: u32 },
    /// Expand 2 click (MCP23017) port snapshot
    #[serde(rename = "io")]
    Io { port_a: u8, port_b: u8, ts: u32 },
    /// Firmware status report
    #[serde(rename = "status")]
    Status {
        polling: bool,
        interval_ms: u32,
        /// Uptime in seconds
        uptime: u32,
        /// Click boards that answered during init
        clicks: &'a Vec<&'static str, 16>,
        /// Board identifier
        board: &'static str,
        /// Firmware version
        version: &'static str,
    },
}

/// Commands sent from a host to the firmware.
///
/// Deserialized manually via [`RawCommand`] in `comm::parse_command()` because
/// `serde_json_core` does not support internally tagged enums (`deserialize_any`).
#[derive(Debug, PartialEq)]
pub enum HostCommand {
    /// Resume polling
    Start,
    /// Pause polling
    Stop,
    /// Request current status
    GetStatus,
    /// Change the polling interval
    SetInterval { ms: u32 },
    /// Zero the load cell with whatever is on it now
    Tare,
    /// Calibrate the load cell against a known weight
    Calibrate { grams: u32 },
}

/// Load-cell work requested by a host command; executed by whoever owns
/// the HX711.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleRequest {
    Tare,
    Calibrate { grams: u32 },
}

/// Wire format for host commands: flat struct that `serde_json_core` can
/// deserialize without `deserialize_any`. Converted to [`HostCommand`] in
/// `comm::parse_command()`.
#[derive(Deserialize)]
pub(crate) struct RawCommand {
    pub cmd: heapless::String<16>,
    #[serde(default)]
    pub ms: Option<u32>,
    #[serde(default)]
    pub grams: Option<u32>,
}

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized JSON message
pub const MAX_MSG_LEN: usize = 256;

/// Buffer type for serialized JSON messages
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;
