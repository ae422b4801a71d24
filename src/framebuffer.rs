//! In-RAM framebuffer for the 160x120 badge screen
//!
//! Pixels are RGB565, stored big-endian two bytes per pixel so the buffer
//! can be streamed to the panel's RAM unchanged.

use alloc::boxed::Box;
use alloc::vec;

use embedded_graphics_core::Pixel;
use embedded_graphics_core::draw_target::DrawTarget;
use embedded_graphics_core::geometry::{OriginDimensions, Size};
use embedded_graphics_core::pixelcolor::raw::RawU16;
use embedded_graphics_core::pixelcolor::Rgb565;
use embedded_graphics_core::prelude::RawData;

/// Screen width in pixels
pub const WIDTH: u32 = 160;
/// Screen height in pixels
pub const HEIGHT: u32 = 120;
/// Buffer size: 2 bytes per pixel
pub const BUFFER_SIZE: usize = WIDTH as usize * HEIGHT as usize * 2;

/// Framebuffer for the whole screen, heap allocated
pub struct Framebuffer {
    buffer: Box<[u8]>,
}

impl Framebuffer {
    /// Create a black framebuffer
    pub fn new() -> Self {
        Self {
            buffer: vec![0u8; BUFFER_SIZE].into_boxed_slice(),
        }
    }

    /// Raw big-endian RGB565 bytes, row-major
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Write a single pixel; out-of-bounds writes are dropped
    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Rgb565) {
        if x >= WIDTH || y >= HEIGHT {
            return;
        }
        let idx = (y * WIDTH + x) as usize * 2;
        let raw = RawU16::from(color).into_inner();
        self.buffer[idx..idx + 2].copy_from_slice(&raw.to_be_bytes());
    }

    /// Read back a pixel
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb565> {
        if x >= WIDTH || y >= HEIGHT {
            return None;
        }
        let idx = (y * WIDTH + x) as usize * 2;
        let raw = u16::from_be_bytes([self.buffer[idx], self.buffer[idx + 1]]);
        Some(Rgb565::from(RawU16::new(raw)))
    }
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl OriginDimensions for Framebuffer {
    fn size(&self) -> Size {
        Size::new(WIDTH, HEIGHT)
    }
}

impl DrawTarget for Framebuffer {
    type Color = Rgb565;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x >= 0 && point.y >= 0 {
                self.set_pixel(point.x as u32, point.y as u32, color);
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        let [hi, lo] = RawU16::from(color).into_inner().to_be_bytes();
        for px in self.buffer.chunks_exact_mut(2) {
            px[0] = hi;
            px[1] = lo;
        }
        Ok(())
    }
}
