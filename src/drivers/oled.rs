//! OLED W click: SSD1306 controller driving a 96×39 monochrome panel over SPI.
//!
//! The panel is wired to columns 32..128 of the controller's 128-column
//! RAM, hence the column offset on every page write. Drawing happens in a
//! local framebuffer; `flush` pushes it out page by page.

use core::convert::Infallible;

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::{DrawTarget, OriginDimensions, Pixel, Size};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiDevice;

use crate::error::Error;

pub const WIDTH: usize = 96;
pub const HEIGHT: usize = 39;
pub const PAGES: usize = HEIGHT.div_ceil(8);
pub const BUFFER_SIZE: usize = WIDTH * PAGES;

const COLUMN_OFFSET: u8 = 32;

#[allow(dead_code)]
mod cmd {
    pub const DISPLAY_OFF: u8 = 0xAE;
    pub const DISPLAY_ON: u8 = 0xAF;
    pub const CONTRAST: u8 = 0x81;
    pub const NORMAL: u8 = 0xA6;
    pub const INVERSE: u8 = 0xA7;
    pub const PAGE_START: u8 = 0xB0;
    pub const COLUMN_LOW: u8 = 0x00;
    pub const COLUMN_HIGH: u8 = 0x10;
}

/// Power-up sequence for the 96×39 glass: multiplex 39, COM remap, charge
/// pump on.
const INIT_SEQUENCE: [u8; 23] = [
    0xAE, // display off
    0xD5, 0x80, // clock divide
    0xA8, 0x26, // multiplex ratio 39
    0xD3, 0x00, // display offset
    0x40, // start line 0
    0x8D, 0x14, // charge pump on
    0xA1, // segment remap
    0xC8, // COM scan descending
    0xDA, 0x12, // COM pins
    0x81, 0x8F, // contrast
    0xD9, 0x25, // pre-charge
    0xDB, 0x20, // VCOMH
    0xA4, // resume from RAM
    0xA6, // normal
    0xAF, // display on
];

const RESET_US: u32 = 10;
const BOOT_MS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub contrast: u8,
}

impl Config {
    pub const fn new() -> Self {
        Self { contrast: 0x8F }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Oled<SPI, DC, RST> {
    spi: SPI,
    dc: DC,
    rst: RST,
    config: Config,
    buffer: [u8; BUFFER_SIZE],
}

impl<SPI, DC, RST, E> Oled<SPI, DC, RST>
where
    SPI: SpiDevice<Error = E>,
    DC: OutputPin,
    RST: OutputPin,
{
    pub fn new(spi: SPI, dc: DC, rst: RST, config: Config) -> Self {
        Self {
            spi,
            dc,
            rst,
            config,
            buffer: [0; BUFFER_SIZE],
        }
    }

    pub fn release(self) -> (SPI, DC, RST) {
        (self.spi, self.dc, self.rst)
    }

    /// Hardware reset followed by the controller init sequence.
    pub fn init<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        self.rst.set_low().map_err(|_| Error::Pin)?;
        delay.delay_us(RESET_US);
        self.rst.set_high().map_err(|_| Error::Pin)?;
        delay.delay_ms(BOOT_MS);
        self.command(&INIT_SEQUENCE)?;
        log::debug!("SSD1306 initialized ({}x{})", WIDTH, HEIGHT);
        Ok(())
    }

    pub fn default_cfg(&mut self) -> Result<(), Error<E>> {
        self.set_contrast(self.config.contrast)?;
        self.clear();
        self.flush()
    }

    pub fn set_contrast(&mut self, contrast: u8) -> Result<(), Error<E>> {
        self.config.contrast = contrast;
        self.command(&[cmd::CONTRAST, contrast])
    }

    pub fn invert(&mut self, inverted: bool) -> Result<(), Error<E>> {
        self.command(&[if inverted { cmd::INVERSE } else { cmd::NORMAL }])
    }

    pub fn display_on(&mut self, on: bool) -> Result<(), Error<E>> {
        self.command(&[if on { cmd::DISPLAY_ON } else { cmd::DISPLAY_OFF }])
    }

    /// Framebuffer only; call `flush` to show it.
    pub fn clear(&mut self) {
        self.buffer.fill(0);
    }

    /// Out-of-range coordinates are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, on: bool) {
        let (x, y) = (x as usize, y as usize);
        if x >= WIDTH || y >= HEIGHT {
            return;
        }
        let byte = &mut self.buffer[(y / 8) * WIDTH + x];
        let bit = 1 << (y % 8);
        if on {
            *byte |= bit;
        } else {
            *byte &= !bit;
        }
    }

    pub fn buffer(&self) -> &[u8; BUFFER_SIZE] {
        &self.buffer
    }

    pub fn flush(&mut self) -> Result<(), Error<E>> {
        for page in 0..PAGES {
            self.command(&[
                cmd::PAGE_START | page as u8,
                cmd::COLUMN_LOW | (COLUMN_OFFSET & 0x0F),
                cmd::COLUMN_HIGH | (COLUMN_OFFSET >> 4),
            ])?;
            self.dc.set_high().map_err(|_| Error::Pin)?;
            let start = page * WIDTH;
            self.spi
                .write(&self.buffer[start..start + WIDTH])
                .map_err(Error::Bus)?;
        }
        Ok(())
    }

    fn command(&mut self, bytes: &[u8]) -> Result<(), Error<E>> {
        self.dc.set_low().map_err(|_| Error::Pin)?;
        self.spi.write(bytes).map_err(Error::Bus)
    }
}

impl<SPI, DC, RST> OriginDimensions for Oled<SPI, DC, RST> {
    fn size(&self) -> Size {
        Size::new(WIDTH as u32, HEIGHT as u32)
    }
}

impl<SPI, DC, RST, E> DrawTarget for Oled<SPI, DC, RST>
where
    SPI: SpiDevice<Error = E>,
    DC: OutputPin,
    RST: OutputPin,
{
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x >= 0 && point.y >= 0 {
                self.set_pixel(point.x as u32, point.y as u32, color.is_on());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::prelude::{Drawable, Point, Primitive};
    use embedded_graphics::primitives::{Line, PrimitiveStyle};
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction as PinTx};
    use embedded_hal_mock::eh1::spi::{Mock as SpiMock, Transaction as SpiTx};

    fn spi_write(bytes: Vec<u8>) -> Vec<SpiTx<u8>> {
        vec![
            SpiTx::transaction_start(),
            SpiTx::write_vec(bytes),
            SpiTx::transaction_end(),
        ]
    }

    #[test]
    fn init_resets_and_sends_sequence() {
        let mut spi = SpiMock::new(&spi_write(INIT_SEQUENCE.to_vec()));
        let mut dc = PinMock::new(&[PinTx::set(State::Low)]);
        let mut rst = PinMock::new(&[PinTx::set(State::Low), PinTx::set(State::High)]);
        let mut oled = Oled::new(spi.clone(), dc.clone(), rst.clone(), Config::new());
        oled.init(&mut NoopDelay::new()).unwrap();
        spi.done();
        dc.done();
        rst.done();
    }

    #[test]
    fn pixels_land_in_page_layout() {
        let mut spi = SpiMock::new(&[]);
        let mut dc = PinMock::new(&[]);
        let mut rst = PinMock::new(&[]);
        let mut oled = Oled::new(spi.clone(), dc.clone(), rst.clone(), Config::new());

        oled.set_pixel(0, 0, true);
        oled.set_pixel(5, 9, true);
        oled.set_pixel(95, 38, true);
        // off the glass
        oled.set_pixel(96, 0, true);
        oled.set_pixel(0, 39, true);

        let buf = oled.buffer();
        assert_eq!(buf[0], 0x01);
        assert_eq!(buf[WIDTH + 5], 0x02);
        assert_eq!(buf[4 * WIDTH + 95], 0x40);
        assert_eq!(buf.iter().filter(|&&b| b != 0).count(), 3);

        oled.set_pixel(5, 9, false);
        assert_eq!(oled.buffer()[WIDTH + 5], 0);
        spi.done();
        dc.done();
        rst.done();
    }

    #[test]
    fn draws_with_embedded_graphics() {
        let mut spi = SpiMock::new(&[]);
        let mut dc = PinMock::new(&[]);
        let mut rst = PinMock::new(&[]);
        let mut oled = Oled::new(spi.clone(), dc.clone(), rst.clone(), Config::new());

        Line::new(Point::new(0, 8), Point::new(WIDTH as i32 - 1, 8))
            .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
            .draw(&mut oled)
            .unwrap();
        Pixel(Point::new(-1, 3), BinaryColor::On).draw(&mut oled).unwrap();

        assert!(oled.buffer()[WIDTH..2 * WIDTH].iter().all(|&b| b == 0x01));
        assert!(oled.buffer()[..WIDTH].iter().all(|&b| b == 0));
        assert_eq!(oled.size(), Size::new(96, 39));
        spi.done();
        dc.done();
        rst.done();
    }

    #[test]
    fn flush_writes_each_page_at_offset() {
        let mut expected = Vec::new();
        let mut dc_tx = Vec::new();
        for page in 0..PAGES as u8 {
            expected.extend(spi_write(vec![0xB0 | page, 0x00, 0x12]));
            let fill = if page == 2 { 0xFF } else { 0x00 };
            expected.extend(spi_write(vec![fill; WIDTH]));
            dc_tx.push(PinTx::set(State::Low));
            dc_tx.push(PinTx::set(State::High));
        }
        let mut spi = SpiMock::new(&expected);
        let mut dc = PinMock::new(&dc_tx);
        let mut rst = PinMock::new(&[]);
        let mut oled = Oled::new(spi.clone(), dc.clone(), rst.clone(), Config::new());
        for x in 0..WIDTH as u32 {
            for y in 16..24 {
                oled.set_pixel(x, y, true);
            }
        }
        oled.flush().unwrap();
        spi.done();
        dc.done();
        rst.done();
    }

    #[test]
    fn contrast_invert_and_power() {
        let mut expected = spi_write(vec![0x81, 0x40]);
        expected.extend(spi_write(vec![0xA7]));
        expected.extend(spi_write(vec![0xAE]));
        let mut spi = SpiMock::new(&expected);
        let mut dc = PinMock::new(&[
            PinTx::set(State::Low),
            PinTx::set(State::Low),
            PinTx::set(State::Low),
        ]);
        let mut rst = PinMock::new(&[]);
        let mut oled = Oled::new(spi.clone(), dc.clone(), rst.clone(), Config::new());
        oled.set_contrast(0x40).unwrap();
        oled.invert(true).unwrap();
        oled.display_on(false).unwrap();
        spi.done();
        dc.done();
        rst.done();
    }
}
