//! IR Gesture click: APDS-9960 proximity, RGBC light and gesture sensor.
//!
//! Gesture data arrives as a FIFO of 4-byte datasets (up, down, left,
//! right photodiode counts). [`GestureTracker`] turns the first and last
//! usable dataset of a swipe into a direction.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::bus::RegisterBus;
use crate::error::Error;

pub const ADDRESS: u8 = 0x39;

/// Known ID register values across silicon revisions.
pub const DEVICE_IDS: [u8; 3] = [0xAB, 0x9C, 0xA8];

#[allow(dead_code)]
mod reg {
    pub const ENABLE: u8 = 0x80;
    pub const ATIME: u8 = 0x81;
    pub const WTIME: u8 = 0x83;
    pub const PERS: u8 = 0x8C;
    pub const CONFIG1: u8 = 0x8D;
    pub const PPULSE: u8 = 0x8E;
    pub const CONTROL: u8 = 0x8F;
    pub const CONFIG2: u8 = 0x90;
    pub const ID: u8 = 0x92;
    pub const STATUS: u8 = 0x93;
    pub const CDATAL: u8 = 0x94;
    pub const PDATA: u8 = 0x9C;
    pub const GPENTH: u8 = 0xA0;
    pub const GEXTH: u8 = 0xA1;
    pub const GCONF1: u8 = 0xA2;
    pub const GCONF2: u8 = 0xA3;
    pub const GOFFSET_U: u8 = 0xA4;
    pub const GOFFSET_D: u8 = 0xA5;
    pub const GPULSE: u8 = 0xA6;
    pub const GOFFSET_L: u8 = 0xA7;
    pub const GOFFSET_R: u8 = 0xA9;
    pub const GCONF3: u8 = 0xAA;
    pub const GCONF4: u8 = 0xAB;
    pub const GFLVL: u8 = 0xAE;
    pub const GSTATUS: u8 = 0xAF;
    pub const GFIFO_U: u8 = 0xFC;
}

mod enable {
    pub const PON: u8 = 0x01;
    pub const AEN: u8 = 0x02;
    pub const PEN: u8 = 0x04;
    pub const WEN: u8 = 0x08;
    pub const GEN: u8 = 0x40;
}

const GSTATUS_GVALID: u8 = 0x01;
const GCONF4_GMODE: u8 = 0x01;

const FIFO_DEPTH: usize = 32;
/// Upper bound on FIFO drains per gesture so a stuck GVALID cannot hang us.
const MAX_FIFO_ROUNDS: u32 = 16;
const FIFO_PAUSE_MS: u32 = 30;

// Timing and pulse settings from the vendor application note
const ATIME_DEFAULT: u8 = 219; // 103 ms
const WTIME_DEFAULT: u8 = 246; // 27 ms
const PPULSE_DEFAULT: u8 = 0x87; // 16 µs, 8 pulses
const CONFIG1_DEFAULT: u8 = 0x60; // no 12x wait
const CONFIG2_DEFAULT: u8 = 0x01; // LED boost 100 %
const GPENTH_DEFAULT: u8 = 40;
const GEXTH_DEFAULT: u8 = 30;
const GCONF1_DEFAULT: u8 = 0x40; // interrupt after 4 datasets
const GPULSE_DEFAULT: u8 = 0xC9; // 32 µs, 10 pulses
const GWTIME_2_8MS: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gain {
    X1 = 0,
    X2 = 1,
    #[default]
    X4 = 2,
    X8 = 3,
}

/// IR LED drive current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedDrive {
    #[default]
    Ma100 = 0,
    Ma50 = 1,
    Ma25 = 2,
    Ma12_5 = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub proximity_gain: Gain,
    /// Light gain; the enum's raw value maps to 1x/4x/16x/64x here.
    pub light_gain: Gain,
    pub led_drive: LedDrive,
    pub gesture_gain: Gain,
    /// Datasets with any channel at or below this are ignored.
    pub noise_threshold: u8,
    /// Minimum ratio delta (in percent points) that counts as a swipe.
    pub sensitivity: i32,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            proximity_gain: Gain::X4,
            light_gain: Gain::X2,
            led_drive: LedDrive::Ma100,
            gesture_gain: Gain::X4,
            noise_threshold: 10,
            sensitivity: 50,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Up,
    Down,
    Left,
    Right,
}

impl Gesture {
    pub fn as_str(self) -> &'static str {
        match self {
            Gesture::Up => "up",
            Gesture::Down => "down",
            Gesture::Left => "left",
            Gesture::Right => "right",
        }
    }
}

/// Clear, red, green and blue channel counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgbc {
    pub clear: u16,
    pub red: u16,
    pub green: u16,
    pub blue: u16,
}

/// One FIFO entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dataset {
    pub up: u8,
    pub down: u8,
    pub left: u8,
    pub right: u8,
}

impl Dataset {
    pub const fn new(up: u8, down: u8, left: u8, right: u8) -> Self {
        Self {
            up,
            down,
            left,
            right,
        }
    }
}

// ── Swipe classifier ──────────────────────────────────────────────────

/// Accumulates the datasets of one swipe. Only the first and the last
/// dataset above the noise floor matter.
#[derive(Debug, Clone)]
pub struct GestureTracker {
    noise_threshold: u8,
    sensitivity: i32,
    first: Dataset,
    last: Dataset,
    valid: u32,
}

impl GestureTracker {
    pub const fn new(noise_threshold: u8, sensitivity: i32) -> Self {
        Self {
            noise_threshold,
            sensitivity,
            first: Dataset::new(0, 0, 0, 0),
            last: Dataset::new(0, 0, 0, 0),
            valid: 0,
        }
    }

    pub fn push(&mut self, data: Dataset) {
        let floor = self.noise_threshold;
        if data.up <= floor || data.down <= floor || data.left <= floor || data.right <= floor {
            return;
        }
        if self.valid == 0 {
            self.first = data;
        }
        self.last = data;
        self.valid += 1;
    }

    /// Datasets that cleared the noise floor so far.
    pub fn valid_count(&self) -> u32 {
        self.valid
    }

    pub fn reset(&mut self) {
        self.first = Dataset::default();
        self.last = Dataset::default();
        self.valid = 0;
    }

    pub fn classify(&self) -> Option<Gesture> {
        if self.valid < 2 {
            return None;
        }

        let ud_delta = ratio(self.last.up, self.last.down) - ratio(self.first.up, self.first.down);
        let lr_delta =
            ratio(self.last.left, self.last.right) - ratio(self.first.left, self.first.right);

        if ud_delta.abs() >= lr_delta.abs() {
            if ud_delta.abs() < self.sensitivity {
                None
            } else if ud_delta > 0 {
                Some(Gesture::Down)
            } else {
                Some(Gesture::Up)
            }
        } else if lr_delta.abs() < self.sensitivity {
            None
        } else if lr_delta > 0 {
            Some(Gesture::Right)
        } else {
            Some(Gesture::Left)
        }
    }
}

// (a − b) / (a + b) in percent
fn ratio(a: u8, b: u8) -> i32 {
    let (a, b) = (a as i32, b as i32);
    if a + b == 0 {
        return 0;
    }
    (a - b) * 100 / (a + b)
}

// ── Driver ────────────────────────────────────────────────────────────

pub struct GestureSensor<I2C> {
    bus: RegisterBus<I2C>,
    config: Config,
}

impl<I2C, E> GestureSensor<I2C>
where
    I2C: I2c<Error = E>,
{
    pub fn new(i2c: I2C, config: Config) -> Self {
        Self {
            bus: RegisterBus::new(i2c, ADDRESS),
            config,
        }
    }

    pub fn release(self) -> I2C {
        self.bus.release()
    }

    pub fn init(&mut self) -> Result<u8, Error<E>> {
        let id = self.bus.read_reg(reg::ID)?;
        if !DEVICE_IDS.contains(&id) {
            log::warn!("APDS-9960: unexpected ID 0x{:02X}", id);
            return Err(Error::UnexpectedId(id));
        }
        log::debug!("APDS-9960 ID 0x{:02X}", id);
        Ok(id)
    }

    /// Power down, then program timing, gains and gesture engine thresholds.
    /// Nothing is enabled afterwards.
    pub fn default_cfg(&mut self) -> Result<(), Error<E>> {
        let c = self.config;
        self.disable()?;
        self.bus.write_reg(reg::ATIME, ATIME_DEFAULT)?;
        self.bus.write_reg(reg::WTIME, WTIME_DEFAULT)?;
        self.bus.write_reg(reg::PPULSE, PPULSE_DEFAULT)?;
        self.bus.write_reg(reg::CONFIG1, CONFIG1_DEFAULT)?;
        self.bus.write_reg(
            reg::CONTROL,
            (c.led_drive as u8) << 6 | (c.proximity_gain as u8) << 2 | c.light_gain as u8,
        )?;
        self.bus.write_reg(reg::CONFIG2, CONFIG2_DEFAULT)?;
        self.bus.write_reg(reg::GPENTH, GPENTH_DEFAULT)?;
        self.bus.write_reg(reg::GEXTH, GEXTH_DEFAULT)?;
        self.bus.write_reg(reg::GCONF1, GCONF1_DEFAULT)?;
        self.bus.write_reg(
            reg::GCONF2,
            (c.gesture_gain as u8) << 5 | (c.led_drive as u8) << 3 | GWTIME_2_8MS,
        )?;
        for offset in [reg::GOFFSET_U, reg::GOFFSET_D, reg::GOFFSET_L, reg::GOFFSET_R] {
            self.bus.write_reg(offset, 0)?;
        }
        self.bus.write_reg(reg::GPULSE, GPULSE_DEFAULT)?;
        // all four photodiodes active
        self.bus.write_reg(reg::GCONF3, 0)
    }

    pub fn enable_gesture(&mut self) -> Result<(), Error<E>> {
        self.bus.modify_reg(reg::GCONF4, GCONF4_GMODE, GCONF4_GMODE)?;
        let bits = enable::PON | enable::WEN | enable::PEN | enable::GEN;
        self.bus.modify_reg(reg::ENABLE, bits, bits)
    }

    pub fn enable_proximity(&mut self) -> Result<(), Error<E>> {
        let bits = enable::PON | enable::PEN;
        self.bus.modify_reg(reg::ENABLE, bits, bits)
    }

    pub fn enable_light(&mut self) -> Result<(), Error<E>> {
        let bits = enable::PON | enable::AEN;
        self.bus.modify_reg(reg::ENABLE, bits, bits)
    }

    /// Power off every engine.
    pub fn disable(&mut self) -> Result<(), Error<E>> {
        self.bus.write_reg(reg::ENABLE, 0)
    }

    /// Proximity count, larger is closer.
    pub fn read_proximity(&mut self) -> Result<u8, Error<E>> {
        self.bus.read_reg(reg::PDATA)
    }

    pub fn read_light(&mut self) -> Result<Rgbc, Error<E>> {
        let mut buf = [0u8; 8];
        self.bus.read_regs(reg::CDATAL, &mut buf)?;
        Ok(Rgbc {
            clear: u16::from_le_bytes([buf[0], buf[1]]),
            red: u16::from_le_bytes([buf[2], buf[3]]),
            green: u16::from_le_bytes([buf[4], buf[5]]),
            blue: u16::from_le_bytes([buf[6], buf[7]]),
        })
    }

    pub fn gesture_available(&mut self) -> Result<bool, Error<E>> {
        Ok(self.bus.read_reg(reg::GSTATUS)? & GSTATUS_GVALID != 0)
    }

    /// Drain the gesture FIFO while GVALID holds and classify the swipe.
    /// `Ok(None)` when nothing was pending or the motion was ambiguous.
    pub fn read_gesture<D: DelayNs>(&mut self, delay: &mut D) -> Result<Option<Gesture>, Error<E>> {
        let mut tracker = GestureTracker::new(self.config.noise_threshold, self.config.sensitivity);
        let mut buf = [0u8; FIFO_DEPTH * 4];

        for _ in 0..MAX_FIFO_ROUNDS {
            if !self.gesture_available()? {
                break;
            }
            let level = (self.bus.read_reg(reg::GFLVL)? as usize).min(FIFO_DEPTH);
            if level > 0 {
                let bytes = &mut buf[..level * 4];
                self.bus.read_regs(reg::GFIFO_U, bytes)?;
                for d in bytes.chunks_exact(4) {
                    tracker.push(Dataset::new(d[0], d[1], d[2], d[3]));
                }
            }
            delay.delay_ms(FIFO_PAUSE_MS);
        }

        let gesture = tracker.classify();
        if let Some(g) = gesture {
            log::debug!(
                "APDS-9960 gesture {} from {} datasets",
                g.as_str(),
                tracker.valid_count()
            );
        }
        Ok(gesture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction};

    const A: u8 = ADDRESS;

    fn tracker() -> GestureTracker {
        GestureTracker::new(10, 50)
    }

    #[test]
    fn needs_two_valid_datasets() {
        let mut t = tracker();
        t.push(Dataset::new(100, 20, 60, 60));
        assert_eq!(t.classify(), None);
        // below the noise floor, ignored
        t.push(Dataset::new(5, 200, 60, 60));
        assert_eq!(t.valid_count(), 1);
        assert_eq!(t.classify(), None);
    }

    #[test]
    fn vertical_swipes() {
        let mut t = tracker();
        t.push(Dataset::new(100, 20, 60, 60));
        t.push(Dataset::new(60, 60, 60, 60));
        t.push(Dataset::new(20, 100, 60, 60));
        assert_eq!(t.classify(), Some(Gesture::Up));

        t.reset();
        t.push(Dataset::new(20, 100, 60, 60));
        t.push(Dataset::new(100, 20, 60, 60));
        assert_eq!(t.classify(), Some(Gesture::Down));
    }

    #[test]
    fn horizontal_swipes() {
        let mut t = tracker();
        t.push(Dataset::new(60, 60, 20, 100));
        t.push(Dataset::new(60, 60, 100, 20));
        assert_eq!(t.classify(), Some(Gesture::Right));

        t.reset();
        t.push(Dataset::new(60, 60, 100, 20));
        t.push(Dataset::new(60, 60, 20, 100));
        assert_eq!(t.classify(), Some(Gesture::Left));
    }

    #[test]
    fn small_motion_is_ignored() {
        let mut t = tracker();
        t.push(Dataset::new(60, 50, 60, 60));
        t.push(Dataset::new(50, 60, 60, 60));
        assert_eq!(t.classify(), None);
    }

    #[test]
    fn larger_axis_wins() {
        let mut t = tracker();
        // U/D moves by 132 points, L/R by 66
        t.push(Dataset::new(100, 20, 40, 80));
        t.push(Dataset::new(20, 100, 80, 40));
        assert_eq!(t.classify(), Some(Gesture::Up));
    }

    #[test]
    fn gesture_names() {
        assert_eq!(Gesture::Left.as_str(), "left");
        assert_eq!(Gesture::Down.as_str(), "down");
    }

    #[test]
    fn init_accepts_known_ids() {
        let mut i2c = I2cMock::new(&[
            Transaction::write_read(A, vec![0x92], vec![0xAB]),
            Transaction::write_read(A, vec![0x92], vec![0xA8]),
            Transaction::write_read(A, vec![0x92], vec![0x55]),
        ]);
        let mut sensor = GestureSensor::new(i2c.clone(), Config::new());
        assert_eq!(sensor.init().unwrap(), 0xAB);
        assert_eq!(sensor.init().unwrap(), 0xA8);
        assert_eq!(sensor.init(), Err(Error::UnexpectedId(0x55)));
        i2c.done();
    }

    #[test]
    fn default_cfg_sequence() {
        let mut i2c = I2cMock::new(&[
            Transaction::write(A, vec![0x80, 0x00]),
            Transaction::write(A, vec![0x81, 219]),
            Transaction::write(A, vec![0x83, 246]),
            Transaction::write(A, vec![0x8E, 0x87]),
            Transaction::write(A, vec![0x8D, 0x60]),
            Transaction::write(A, vec![0x8F, 0x09]),
            Transaction::write(A, vec![0x90, 0x01]),
            Transaction::write(A, vec![0xA0, 40]),
            Transaction::write(A, vec![0xA1, 30]),
            Transaction::write(A, vec![0xA2, 0x40]),
            Transaction::write(A, vec![0xA3, 0x41]),
            Transaction::write(A, vec![0xA4, 0x00]),
            Transaction::write(A, vec![0xA5, 0x00]),
            Transaction::write(A, vec![0xA7, 0x00]),
            Transaction::write(A, vec![0xA9, 0x00]),
            Transaction::write(A, vec![0xA6, 0xC9]),
            Transaction::write(A, vec![0xAA, 0x00]),
        ]);
        let mut sensor = GestureSensor::new(i2c.clone(), Config::new());
        sensor.default_cfg().unwrap();
        i2c.done();
    }

    #[test]
    fn enable_gesture_sets_gmode_and_enable_bits() {
        let mut i2c = I2cMock::new(&[
            Transaction::write_read(A, vec![0xAB], vec![0x00]),
            Transaction::write(A, vec![0xAB, 0x01]),
            Transaction::write_read(A, vec![0x80], vec![0x01]),
            Transaction::write(A, vec![0x80, 0x4D]),
        ]);
        let mut sensor = GestureSensor::new(i2c.clone(), Config::new());
        sensor.enable_gesture().unwrap();
        i2c.done();
    }

    #[test]
    fn proximity_and_light_engines() {
        let mut i2c = I2cMock::new(&[
            // PON | PEN on top of whatever is running
            Transaction::write_read(A, vec![0x80], vec![0x00]),
            Transaction::write(A, vec![0x80, 0x05]),
            // PON | AEN, PEN kept
            Transaction::write_read(A, vec![0x80], vec![0x05]),
            Transaction::write(A, vec![0x80, 0x07]),
            // already on: no write
            Transaction::write_read(A, vec![0x80], vec![0x07]),
            Transaction::write_read(A, vec![0x9C], vec![0xC8]),
        ]);
        let mut sensor = GestureSensor::new(i2c.clone(), Config::new());
        sensor.enable_proximity().unwrap();
        sensor.enable_light().unwrap();
        sensor.enable_proximity().unwrap();
        assert_eq!(sensor.read_proximity().unwrap(), 200);
        i2c.done();
    }

    #[test]
    fn read_light_decodes_channels() {
        let mut i2c = I2cMock::new(&[Transaction::write_read(
            A,
            vec![0x94],
            vec![0x10, 0x01, 0x20, 0x00, 0x30, 0x00, 0x40, 0x00],
        )]);
        let mut sensor = GestureSensor::new(i2c.clone(), Config::new());
        assert_eq!(
            sensor.read_light().unwrap(),
            Rgbc {
                clear: 0x0110,
                red: 0x20,
                green: 0x30,
                blue: 0x40
            }
        );
        i2c.done();
    }

    #[test]
    fn read_gesture_drains_fifo() {
        let mut i2c = I2cMock::new(&[
            Transaction::write_read(A, vec![0xAF], vec![0x01]),
            Transaction::write_read(A, vec![0xAE], vec![2]),
            Transaction::write_read(A, vec![0xFC], vec![60, 60, 100, 20, 60, 60, 60, 60]),
            Transaction::write_read(A, vec![0xAF], vec![0x01]),
            Transaction::write_read(A, vec![0xAE], vec![1]),
            Transaction::write_read(A, vec![0xFC], vec![60, 60, 20, 100]),
            Transaction::write_read(A, vec![0xAF], vec![0x00]),
        ]);
        let mut sensor = GestureSensor::new(i2c.clone(), Config::new());
        let gesture = sensor.read_gesture(&mut NoopDelay::new()).unwrap();
        assert_eq!(gesture, Some(Gesture::Left));
        i2c.done();
    }

    #[test]
    fn read_gesture_without_data() {
        let mut i2c = I2cMock::new(&[Transaction::write_read(A, vec![0xAF], vec![0x00])]);
        let mut sensor = GestureSensor::new(i2c.clone(), Config::new());
        assert_eq!(sensor.read_gesture(&mut NoopDelay::new()).unwrap(), None);
        i2c.done();
    }
}
