use std::fs;
use std::path::Path;

use embedded_graphics::mono_font::iso_8859_1::{FONT_10X20, FONT_9X15};
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};

use crate::api::departures::DepartureSample;
use crate::display::FrameBuffer;

/// Anchor points (top-left) of each dashboard element.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub clock: Point,
    pub bikes: Point,
    pub departures: Point,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            clock: Point::new(118, 45),
            bikes: Point::new(300, 45),
            departures: Point::new(70, 525),
        }
    }
}

/// What one cycle puts on the panel.
#[derive(Debug)]
pub struct DashboardView<'a> {
    pub clock: &'a str,
    pub departures: &'a [DepartureSample],
    pub bikes: Option<u32>,
}

/// The configured background, or a blank frame when it is missing or does
/// not match the panel.
pub fn load_background(path: Option<&Path>, width: u32, height: u32) -> FrameBuffer {
    let path = match path {
        Some(path) => path,
        None => return FrameBuffer::new(width, height),
    };

    let frame = fs::read(path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| FrameBuffer::from_pbm(&bytes).map_err(|e| e.to_string()));

    match frame {
        Ok(frame) if frame.width() == width && frame.height() == height => frame,
        Ok(frame) => {
            log::warn!(
                "background {:?} is {}x{}, expected {}x{}; using blank canvas",
                path,
                frame.width(),
                frame.height(),
                width,
                height
            );
            FrameBuffer::new(width, height)
        }
        Err(err) => {
            log::warn!("cannot load background {:?}: {}; using blank canvas", path, err);
            FrameBuffer::new(width, height)
        }
    }
}

pub fn render(frame: &mut FrameBuffer, view: &DashboardView, layout: &Layout) {
    let large = MonoTextStyle::new(&FONT_10X20, BinaryColor::On);
    let small = MonoTextStyle::new(&FONT_9X15, BinaryColor::On);

    draw(frame, view.clock, layout.clock, large);

    let bikes = match view.bikes {
        Some(count) => format!("Bikes: {}", count),
        None => "Bikes: -".to_string(),
    };
    draw(frame, &bikes, layout.bikes, large);

    let mut cursor = layout.departures;
    for sample in view.departures {
        draw(frame, &sample.direction, cursor, large);
        cursor.y += 40;
        for time in &sample.times {
            draw(frame, &format!("- {}", time), cursor + Point::new(10, 0), small);
            cursor.y += 28;
        }
        cursor.y += 20;
    }
}

fn draw(frame: &mut FrameBuffer, text: &str, at: Point, style: MonoTextStyle<'_, BinaryColor>) {
    // FrameBuffer drawing is infallible
    let _ = Text::with_baseline(text, at, style, Baseline::Top).draw(frame);
}
