/// Status screen for the OLED W click (SSD1306, 96x39, monochrome).
///
/// Four rows of 5x8 text: polling state, weight and range, air quality and
/// battery, last gesture. The poll loop owns the panel and redraws after
/// every round; nothing here touches the bus except the final flush.

use core::fmt::Write;

use embedded_graphics::mono_font::ascii::FONT_5X8;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Baseline, Text};

use crate::comm;
use crate::protocol::VERSION;

/// Panel width in pixels
const W: i32 = 96;

/// Row pitch: 8px glyphs plus one blank line
const ROW_H: i32 = 10;

/// Glyph advance of FONT_5X8
const CHAR_W: i32 = 5;

/// Latest values shown on the status screen. `None` means the click is
/// missing or has not produced a reading yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct Summary {
    pub polling: bool,
    pub weight_mg: Option<i32>,
    pub range_mm: Option<u8>,
    pub eco2_ppm: Option<u16>,
    pub battery_c100: Option<u16>,
    pub gesture: Option<&'static str>,
}

fn text_at(display: &mut impl DrawTarget<Color = BinaryColor>, text: &str, x: i32, row: i32) {
    let style = MonoTextStyle::new(&FONT_5X8, BinaryColor::On);
    let _ = Text::with_baseline(text, Point::new(x, row * ROW_H), style, Baseline::Top).draw(display);
}

pub fn draw_splash(display: &mut impl DrawTarget<Color = BinaryColor>) {
    let _ = display.clear(BinaryColor::Off);

    let title = "CLICK DEMO";
    text_at(display, title, (W - CHAR_W * title.len() as i32) / 2, 1);

    let mut ver = heapless::String::<20>::new();
    let _ = write!(ver, "v{}", VERSION);
    text_at(display, &ver, (W - CHAR_W * ver.len() as i32) / 2, 2);
}

pub fn draw_summary(display: &mut impl DrawTarget<Color = BinaryColor>, summary: &Summary) {
    let _ = display.clear(BinaryColor::Off);

    // ── Header: inverted bar with run state ─────────────────────────────
    let _ = Rectangle::new(Point::zero(), Size::new(W as u32, ROW_H as u32 - 1))
        .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
        .draw(display);
    let inverted = MonoTextStyle::new(&FONT_5X8, BinaryColor::Off);
    let state = if summary.polling { "RUN" } else { "STOP" };
    let _ = Text::with_baseline("CLICKS", Point::new(1, 0), inverted, Baseline::Top).draw(display);
    let _ = Text::with_baseline(
        state,
        Point::new(W - CHAR_W * state.len() as i32 - 1, 0),
        inverted,
        Baseline::Top,
    )
    .draw(display);

    let mut line = heapless::String::<24>::new();

    // ── Weight / range ──────────────────────────────────────────────────
    match summary.weight_mg {
        Some(mg) => {
            let _ = comm::write_grams(&mut line, mg);
        }
        None => {
            let _ = line.push_str("---g");
        }
    }
    match summary.range_mm {
        Some(mm) => {
            let _ = write!(line, " {}mm", mm);
        }
        None => {
            let _ = line.push_str(" ---mm");
        }
    }
    text_at(display, &line, 0, 1);

    // ── Air quality / battery ───────────────────────────────────────────
    line.clear();
    match summary.eco2_ppm {
        Some(ppm) => {
            let _ = write!(line, "CO2 {}", ppm);
        }
        None => {
            let _ = line.push_str("CO2 ---");
        }
    }
    if let Some(soc) = summary.battery_c100 {
        let _ = write!(line, " {}%", soc / 100);
    }
    text_at(display, &line, 0, 2);

    // ── Last gesture ────────────────────────────────────────────────────
    line.clear();
    let _ = write!(line, "gest {}", summary.gesture.unwrap_or("---"));
    text_at(display, &line, 0, 3);
}
