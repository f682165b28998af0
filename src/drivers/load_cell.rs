//! Load Cell click: HX711 24-bit bridge ADC, bit-banged over two GPIOs.
//!
//! DOUT goes low when a conversion is ready. The host then clocks out 24
//! bits MSB first on SCK, plus 1–3 extra pulses that pick the channel and
//! gain of the *next* conversion.

use core::convert::Infallible;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use super::poll_until;
use crate::error::Error;

/// No bus involved, only pin faults.
pub type LoadCellError = Error<Infallible>;

const PULSE_US: u32 = 1;
/// SCK held high this long powers the chip down.
const POWER_DOWN_US: u32 = 70;
// 10 SPS worst case
const READY_POLLS: u32 = 200;
const READY_POLL_US: u32 = 1000;

/// Input channel and gain, encoded as total SCK pulses per read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gain {
    #[default]
    A128 = 25,
    B32 = 26,
    A64 = 27,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub gain: Gain,
    /// Conversions averaged by `tare`, `calibrate` and friends when the
    /// caller has no better idea.
    pub samples: u8,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            gain: Gain::A128,
            samples: 10,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

pub struct LoadCell<SCK, DOUT> {
    sck: SCK,
    dout: DOUT,
    config: Config,
    offset: i32,
    counts_per_gram: f32,
}

impl<SCK, DOUT> LoadCell<SCK, DOUT>
where
    SCK: OutputPin,
    DOUT: InputPin,
{
    pub fn new(sck: SCK, dout: DOUT, config: Config) -> Self {
        Self {
            sck,
            dout,
            config,
            offset: 0,
            counts_per_gram: 1.0,
        }
    }

    pub fn release(self) -> (SCK, DOUT) {
        (self.sck, self.dout)
    }

    /// Power up and throw away one conversion so the gain setting latches.
    pub fn init<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), LoadCellError> {
        self.power_up()?;
        self.read_raw(delay)?;
        log::debug!("HX711 up, gain {:?}", self.config.gain);
        Ok(())
    }

    pub fn set_gain<D: DelayNs>(&mut self, delay: &mut D, gain: Gain) -> Result<(), LoadCellError> {
        self.config.gain = gain;
        self.read_raw(delay).map(|_| ())
    }

    pub fn is_ready(&mut self) -> Result<bool, LoadCellError> {
        self.dout.is_low().map_err(|_| Error::Pin)
    }

    /// One signed 24-bit conversion.
    pub fn read_raw<D: DelayNs>(&mut self, delay: &mut D) -> Result<i32, LoadCellError> {
        poll_until(delay, READY_POLLS, READY_POLL_US, || self.is_ready())?;

        let mut value: u32 = 0;
        for _ in 0..24 {
            self.sck.set_high().map_err(|_| Error::Pin)?;
            delay.delay_us(PULSE_US);
            let bit = self.dout.is_high().map_err(|_| Error::Pin)?;
            self.sck.set_low().map_err(|_| Error::Pin)?;
            delay.delay_us(PULSE_US);
            value = value << 1 | bit as u32;
        }
        for _ in 24..self.config.gain as u8 {
            self.sck.set_high().map_err(|_| Error::Pin)?;
            delay.delay_us(PULSE_US);
            self.sck.set_low().map_err(|_| Error::Pin)?;
            delay.delay_us(PULSE_US);
        }

        Ok(((value << 8) as i32) >> 8)
    }

    pub fn read_average<D: DelayNs>(&mut self, delay: &mut D, n: u8) -> Result<i32, LoadCellError> {
        if n == 0 {
            return Err(Error::InvalidArgument);
        }
        let mut sum: i64 = 0;
        for _ in 0..n {
            sum += self.read_raw(delay)? as i64;
        }
        Ok((sum / n as i64) as i32)
    }

    /// Record the current (empty) reading as zero.
    pub fn tare<D: DelayNs>(&mut self, delay: &mut D, n: u8) -> Result<i32, LoadCellError> {
        self.offset = self.read_average(delay, n)?;
        log::debug!("HX711 tare offset {}", self.offset);
        Ok(self.offset)
    }

    /// Derive the scale from a known mass resting on the cell. Run `tare`
    /// first.
    pub fn calibrate<D: DelayNs>(
        &mut self,
        delay: &mut D,
        known_grams: u32,
        n: u8,
    ) -> Result<f32, LoadCellError> {
        if known_grams == 0 {
            return Err(Error::InvalidArgument);
        }
        let counts = self.read_average(delay, n)? - self.offset;
        if counts == 0 {
            log::warn!("HX711: no change under {} g, calibration skipped", known_grams);
            return Err(Error::Response);
        }
        self.counts_per_gram = counts as f32 / known_grams as f32;
        Ok(self.counts_per_gram)
    }

    pub fn weight_grams<D: DelayNs>(&mut self, delay: &mut D, n: u8) -> Result<f32, LoadCellError> {
        let raw = self.read_average(delay, n)?;
        Ok(self.to_grams(raw))
    }

    pub fn to_grams(&self, raw: i32) -> f32 {
        (raw - self.offset) as f32 / self.counts_per_gram
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: i32) {
        self.offset = offset;
    }

    pub fn counts_per_gram(&self) -> f32 {
        self.counts_per_gram
    }

    pub fn set_counts_per_gram(&mut self, scale: f32) {
        self.counts_per_gram = scale;
    }

    pub fn samples(&self) -> u8 {
        self.config.samples
    }

    pub fn power_down<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), LoadCellError> {
        self.sck.set_low().map_err(|_| Error::Pin)?;
        self.sck.set_high().map_err(|_| Error::Pin)?;
        delay.delay_us(POWER_DOWN_US);
        Ok(())
    }

    /// The chip comes back on channel A, gain 128; the next read
    /// re-applies the configured gain.
    pub fn power_up(&mut self) -> Result<(), LoadCellError> {
        self.sck.set_low().map_err(|_| Error::Pin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction as PinTx};

    fn clock(pulses: usize) -> Vec<PinTx> {
        (0..pulses)
            .flat_map(|_| [PinTx::set(State::High), PinTx::set(State::Low)])
            .collect()
    }

    /// Ready check followed by the 24 data bits of `value`.
    fn conversion(value: u32) -> Vec<PinTx> {
        let mut tx = vec![PinTx::get(State::Low)];
        for i in (0..24).rev() {
            let state = if value >> i & 1 == 1 {
                State::High
            } else {
                State::Low
            };
            tx.push(PinTx::get(state));
        }
        tx
    }

    #[test]
    fn reads_positive_value() {
        let mut sck = PinMock::new(&clock(25));
        let mut dout = PinMock::new(&conversion(0x000100));
        let mut cell = LoadCell::new(sck.clone(), dout.clone(), Config::new());
        assert_eq!(cell.read_raw(&mut NoopDelay::new()).unwrap(), 256);
        sck.done();
        dout.done();
    }

    #[test]
    fn sign_extends_negative_values() {
        let mut sck = PinMock::new(&[clock(25), clock(25)].concat());
        let mut dout = PinMock::new(&[conversion(0xFFFFFF), conversion(0x800000)].concat());
        let mut cell = LoadCell::new(sck.clone(), dout.clone(), Config::new());
        assert_eq!(cell.read_raw(&mut NoopDelay::new()).unwrap(), -1);
        assert_eq!(cell.read_raw(&mut NoopDelay::new()).unwrap(), -8_388_608);
        sck.done();
        dout.done();
    }

    #[test]
    fn gain_sets_extra_pulses() {
        let config = Config {
            gain: Gain::A64,
            ..Config::new()
        };
        let mut sck = PinMock::new(&clock(27));
        let mut dout = PinMock::new(&conversion(5));
        let mut cell = LoadCell::new(sck.clone(), dout.clone(), config);
        assert_eq!(cell.read_raw(&mut NoopDelay::new()).unwrap(), 5);
        sck.done();
        dout.done();
    }

    #[test]
    fn waits_for_ready() {
        let mut dout_tx = vec![PinTx::get(State::High), PinTx::get(State::High)];
        dout_tx.extend(conversion(1));
        let mut sck = PinMock::new(&clock(25));
        let mut dout = PinMock::new(&dout_tx);
        let mut cell = LoadCell::new(sck.clone(), dout.clone(), Config::new());
        assert_eq!(cell.read_raw(&mut NoopDelay::new()).unwrap(), 1);
        sck.done();
        dout.done();
    }

    #[test]
    fn times_out_when_never_ready() {
        let mut sck = PinMock::new(&[]);
        let dout_tx: Vec<_> = (0..READY_POLLS).map(|_| PinTx::get(State::High)).collect();
        let mut dout = PinMock::new(&dout_tx);
        let mut cell = LoadCell::new(sck.clone(), dout.clone(), Config::new());
        assert_eq!(cell.read_raw(&mut NoopDelay::new()), Err(Error::Timeout));
        sck.done();
        dout.done();
    }

    #[test]
    fn tare_calibrate_and_weigh() {
        let reads = [1000, 1002, 3000, 3002, 2000, 2000];
        let sck_tx: Vec<_> = reads.iter().flat_map(|_| clock(25)).collect();
        let dout_tx: Vec<_> = reads.iter().flat_map(|&v| conversion(v)).collect();
        let mut sck = PinMock::new(&sck_tx);
        let mut dout = PinMock::new(&dout_tx);
        let mut cell = LoadCell::new(sck.clone(), dout.clone(), Config::new());
        let mut delay = NoopDelay::new();

        assert_eq!(cell.tare(&mut delay, 2).unwrap(), 1001);
        // 2000 counts over 100 g
        assert_eq!(cell.calibrate(&mut delay, 100, 2).unwrap(), 20.0);
        assert_eq!(cell.weight_grams(&mut delay, 2).unwrap(), 49.95);
        sck.done();
        dout.done();
    }

    #[test]
    fn rejects_bad_arguments() {
        let mut sck = PinMock::new(&[]);
        let mut dout = PinMock::new(&[]);
        let mut cell = LoadCell::new(sck.clone(), dout.clone(), Config::new());
        let mut delay = NoopDelay::new();
        assert_eq!(cell.read_average(&mut delay, 0), Err(Error::InvalidArgument));
        assert_eq!(cell.calibrate(&mut delay, 0, 1), Err(Error::InvalidArgument));
        sck.done();
        dout.done();
    }

    #[test]
    fn power_cycle() {
        let mut sck = PinMock::new(&[
            PinTx::set(State::Low),
            PinTx::set(State::High),
            PinTx::set(State::Low),
        ]);
        let mut dout = PinMock::new(&[]);
        let mut cell = LoadCell::new(sck.clone(), dout.clone(), Config::new());
        cell.power_down(&mut NoopDelay::new()).unwrap();
        cell.power_up().unwrap();
        sck.done();
        dout.done();
    }
}
