//! Decoded 3-channel images on both sides of the codec: input photographs
//! for the fitter and rendered output from the renderer.

use crate::error::{PtmError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Rgb,
    /// JPEG/JFIF full-range YCbCr.
    YCbCr,
}

/// An input photograph, 3 interleaved channels, rows stored bottom-up.
#[derive(Debug, Clone, PartialEq)]
pub struct Photo {
    pub width: usize,
    pub height: usize,
    pub color_space: ColorSpace,
    pub pixels: Vec<u8>,
}

impl Photo {
    /// Wrap a top-down interleaved buffer (as image decoders produce it),
    /// flipping it into PTM bottom-up row order.
    pub fn from_top_down(
        width: usize,
        height: usize,
        color_space: ColorSpace,
        pixels: Vec<u8>,
    ) -> Result<Self> {
        if pixels.len() != width * height * 3 {
            return Err(PtmError::Codec(format!(
                "expected {} bytes for a {width}x{height} 3-channel image, got {}",
                width * height * 3,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            color_space,
            pixels: flip_rows(&pixels, width * 3),
        })
    }

    /// Convert in place to `target`, if not already there.
    pub fn into_color_space(mut self, target: ColorSpace) -> Self {
        if self.color_space != target {
            let convert: fn([u8; 3]) -> [u8; 3] = match target {
                ColorSpace::YCbCr => rgb_to_ycbcr,
                ColorSpace::Rgb => ycbcr_to_rgb,
            };
            for px in self.pixels.chunks_exact_mut(3) {
                let out = convert([px[0], px[1], px[2]]);
                px.copy_from_slice(&out);
            }
            self.color_space = target;
        }
        self
    }
}

/// A rendered output image, 3 interleaved channels, rows top-down.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pub width: usize,
    pub height: usize,
    pub color_space: ColorSpace,
    pub pixels: Vec<u8>,
}

impl RenderedImage {
    /// The pixels as RGB, converting from YCbCr if necessary.
    pub fn to_rgb(&self) -> Vec<u8> {
        match self.color_space {
            ColorSpace::Rgb => self.pixels.clone(),
            ColorSpace::YCbCr => self
                .pixels
                .chunks_exact(3)
                .flat_map(|px| ycbcr_to_rgb([px[0], px[1], px[2]]))
                .collect(),
        }
    }
}

pub(crate) fn flip_rows(pixels: &[u8], row_stride: usize) -> Vec<u8> {
    if row_stride == 0 {
        return pixels.to_vec();
    }
    pixels
        .chunks_exact(row_stride)
        .rev()
        .flatten()
        .copied()
        .collect()
}

// ── JFIF color conversion ───────────────────────────────────────────────────

#[inline]
pub fn clip_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

pub fn rgb_to_ycbcr([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    [
        clip_u8(0.299 * r + 0.587 * g + 0.114 * b),
        clip_u8(128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b),
        clip_u8(128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b),
    ]
}

pub fn ycbcr_to_rgb([y, cb, cr]: [u8; 3]) -> [u8; 3] {
    let y = y as f32;
    let cb = cb as f32 - 128.0;
    let cr = cr as f32 - 128.0;
    [
        clip_u8(y + 1.402 * cr),
        clip_u8(y - 0.344_14 * cb - 0.714_14 * cr),
        clip_u8(y + 1.772 * cb),
    ]
}
