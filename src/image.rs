//! PNG decoding for the avatar and QR images

use alloc::vec;
use alloc::vec::Vec;

use log::{debug, warn};
use thiserror::Error;

/// Image error types
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    #[error("invalid PNG header")]
    Header,
    #[error("image too large: {0}x{1}")]
    TooLarge(u32, u32),
    #[error("PNG decode failed")]
    Decode,
}

/// Decoded RGBA8 image
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl core::fmt::Debug for Image {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Image({}x{})", self.width, self.height)
    }
}

impl Image {
    /// Decode a PNG, rejecting images with more than `max_pixels` pixels.
    ///
    /// Any color type and bit depth is converted to RGBA8. The decode buffer
    /// is sized from the header and dropped before returning.
    pub fn decode(png: &[u8], max_pixels: u32) -> Result<Self, ImageError> {
        let header = minipng::decode_png_header(png).map_err(|_| ImageError::Header)?;
        let (width, height) = (header.width(), header.height());
        debug!("PNG: {}x{} {:?}", width, height, header.color_type());

        if width.saturating_mul(height) > max_pixels {
            warn!("PNG too large: {}x{}", width, height);
            return Err(ImageError::TooLarge(width, height));
        }

        let len = header
            .required_bytes_rgba8bpc()
            .max(header.required_bytes());
        let mut buf = vec![0u8; len];
        let mut image = minipng::decode_png(png, &mut buf).map_err(|e| {
            warn!("minipng error: {:?}", e);
            ImageError::Decode
        })?;
        image.convert_to_rgba8bpc().map_err(|_| ImageError::Decode)?;

        Ok(Self {
            width,
            height,
            rgba: image.pixels().to_vec(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// RGBA components at (x, y), or `None` outside the image
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 4) as usize;
        let px = self.rgba.get(i..i + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}
