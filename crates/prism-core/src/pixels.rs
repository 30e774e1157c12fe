//! Decoded pixel buffers.

use crate::error::{Error, Result};

/// Tightly packed 8-bit pixels as delivered by an image decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    /// Channels per pixel (1 to 4).
    pub channels: u32,
    pub pixels: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap decoded pixels, checking the length against the dimensions.
    pub fn new(width: u32, height: u32, channels: u32, pixels: Vec<u8>) -> Result<Self> {
        if !(1..=4).contains(&channels) {
            return Err(Error::InvalidData(format!(
                "unsupported channel count {channels}"
            )));
        }
        if width == 0 || height == 0 {
            return Err(Error::InvalidData(format!(
                "empty pixel buffer {width}x{height}"
            )));
        }

        let expected = width as usize * height as usize * channels as usize;
        if pixels.len() != expected {
            return Err(Error::PixelSizeMismatch {
                width,
                height,
                channels,
                expected,
                actual: pixels.len(),
            });
        }

        Ok(Self {
            width,
            height,
            channels,
            pixels,
        })
    }

    /// A two-colour RGBA checkerboard, handy when no texture is supplied.
    pub fn checkerboard(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Result<Self> {
        let cell = cell.max(1);
        let pixels = (0..size)
            .flat_map(|y| (0..size).map(move |x| (x, y)))
            .flat_map(|(x, y)| if ((x / cell) + (y / cell)) % 2 == 0 { a } else { b })
            .collect();
        Self::new(size, size, 4, pixels)
    }

    /// Number of texels.
    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Expand to RGBA8 (grey → grey/grey/grey/255, grey+alpha, RGB → RGB/255).
    pub fn to_rgba8(&self) -> Vec<u8> {
        if self.channels == 4 {
            return self.pixels.clone();
        }

        let mut out = Vec::with_capacity(self.texel_count() * 4);
        for texel in self.pixels.chunks_exact(self.channels as usize) {
            match *texel {
                [l] => out.extend_from_slice(&[l, l, l, 255]),
                [l, a] => out.extend_from_slice(&[l, l, l, a]),
                [r, g, b] => out.extend_from_slice(&[r, g, b, 255]),
                _ => unreachable!("channel count validated on construction"),
            }
        }
        out
    }
}
