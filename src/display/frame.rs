use std::convert::Infallible;

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::{DrawTarget, OriginDimensions, Pixel, Size};

use crate::display::{DisplayError, Rect};

/// 1-bit frame: rows packed MSB first, a set bit is black ink.
///
/// This is the same layout as the raster of a binary PBM (P4) image, so
/// frames are read and written as PBM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// A blank (white) frame.
    pub fn new(width: u32, height: u32) -> Self {
        let row_bytes = Self::row_bytes_for(width);
        Self {
            width,
            height,
            data: vec![0; row_bytes * height as usize],
        }
    }

    fn row_bytes_for(width: u32) -> usize {
        (width / 8) as usize + usize::from(width % 8 != 0)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<bool> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let (index, mask) = self.locate(x, y);
        Some(self.data[index] & mask != 0)
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, black: bool) {
        if x >= self.width || y >= self.height {
            return;
        }
        let (index, mask) = self.locate(x, y);
        if black {
            self.data[index] |= mask;
        } else {
            self.data[index] &= !mask;
        }
    }

    fn locate(&self, x: u32, y: u32) -> (usize, u8) {
        let index = y as usize * Self::row_bytes_for(self.width) + (x / 8) as usize;
        (index, 0x80 >> (x % 8))
    }

    pub fn ink_count(&self) -> u32 {
        self.data.iter().map(|b| b.count_ones()).sum()
    }

    pub fn to_pbm(&self) -> Vec<u8> {
        let mut out = format!("P4\n{} {}\n", self.width, self.height).into_bytes();
        out.extend_from_slice(&self.data);
        out
    }

    pub fn from_pbm(bytes: &[u8]) -> Result<Self, DisplayError> {
        let mut header = PbmHeader { bytes, pos: 0 };

        if header.token()? != b"P4" {
            return Err(DisplayError::InvalidImage("not a binary PBM (P4)".to_string()));
        }
        let width = header.number()?;
        let height = header.number()?;

        // exactly one whitespace byte separates the header from the raster
        let start = header.pos + 1;
        let end = Self::row_bytes_for(width)
            .checked_mul(height as usize)
            .and_then(|expected| expected.checked_add(start))
            .ok_or_else(|| {
                DisplayError::InvalidImage(format!("{}x{} is too large", width, height))
            })?;
        let raster = bytes
            .get(start..end)
            .ok_or_else(|| DisplayError::InvalidImage("truncated raster".to_string()))?;

        Ok(Self {
            width,
            height,
            data: raster.to_vec(),
        })
    }
}

struct PbmHeader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> PbmHeader<'a> {
    fn token(&mut self) -> Result<&'a [u8], DisplayError> {
        loop {
            match self.bytes.get(self.pos) {
                Some(b'#') => {
                    while !matches!(self.bytes.get(self.pos), Some(b'\n') | None) {
                        self.pos += 1;
                    }
                }
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(_) => break,
                None => return Err(DisplayError::InvalidImage("truncated header".to_string())),
            }
        }

        let bytes = self.bytes;
        let start = self.pos;
        while matches!(bytes.get(self.pos), Some(b) if !b.is_ascii_whitespace()) {
            self.pos += 1;
        }
        Ok(&bytes[start..self.pos])
    }

    fn number(&mut self) -> Result<u32, DisplayError> {
        let token = self.token()?;
        std::str::from_utf8(token)
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                DisplayError::InvalidImage(format!(
                    "bad dimension {:?}",
                    String::from_utf8_lossy(token)
                ))
            })
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for FrameBuffer {
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
