use serde::Serialize;

use crate::error::{PtmError, Result};

/// Magic line that opens every PTM 1.2 file.
pub const MAGIC: &str = "PTM_1.2";

/// Number of polynomial coefficients per pixel: cu², cv², cuv, cu, cv, c1.
pub const PTM_COEFFICIENTS: usize = 6;

/// Bytes per pixel allocated for a plain color block, whatever its wire width.
pub const COLOR_SAMPLE_SIZE: usize = 3;

/// Fewest light samples the fitter accepts for six unknowns.
pub const MIN_LIGHTS: usize = 12;

/// Compression quality used when a file carries none (uncompressed formats).
pub const DEFAULT_QUALITY: i32 = 90;

// ── Format ids ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FormatId {
    Rgb,
    JpegRgb,
    Lrgb,
    JpegLrgb,
    Lum,
}

impl FormatId {
    pub fn descriptor(self) -> &'static FormatDescriptor {
        // FORMATS is indexed in FormatId declaration order.
        &FORMATS[self as usize]
    }
}

/// How the non-polynomial part of a pixel is stored and reconstructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorLayout {
    /// One polynomial per R, G, B channel; no color block.
    Rgb,
    /// Luma polynomial plus an averaged RGB color block.
    Lrgb,
    /// Luma polynomial plus an averaged (Cb, Cr) chroma block.
    Lum,
}

// ── Registry ────────────────────────────────────────────────────────────────

/// Static description of one PTM variant.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct FormatDescriptor {
    pub id: FormatId,
    /// Blocks to allocate: coefficient blocks plus an optional color block.
    pub total_blocks: usize,
    /// Blocks holding six polynomial coefficients per pixel (1 or 3).
    pub coefficient_blocks: usize,
    /// Channels stored verbatim in the color block: 0 (RGB), 2 (LUM), or 3 (LRGB).
    pub plain_color_channels: usize,
    /// Independent grayscale codec streams; 0 for uncompressed variants.
    pub stream_count: usize,
    pub name: &'static str,
}

pub static FORMATS: [FormatDescriptor; 5] = [
    FormatDescriptor {
        id: FormatId::Rgb,
        total_blocks: 3,
        coefficient_blocks: 3,
        plain_color_channels: 0,
        stream_count: 0,
        name: "PTM_FORMAT_RGB",
    },
    FormatDescriptor {
        id: FormatId::JpegRgb,
        total_blocks: 3,
        coefficient_blocks: 3,
        plain_color_channels: 0,
        stream_count: 18,
        name: "PTM_FORMAT_JPEG_RGB",
    },
    FormatDescriptor {
        id: FormatId::Lrgb,
        total_blocks: 2,
        coefficient_blocks: 1,
        plain_color_channels: 3,
        stream_count: 0,
        name: "PTM_FORMAT_LRGB",
    },
    FormatDescriptor {
        id: FormatId::JpegLrgb,
        total_blocks: 2,
        coefficient_blocks: 1,
        plain_color_channels: 3,
        stream_count: 9,
        name: "PTM_FORMAT_JPEG_LRGB",
    },
    FormatDescriptor {
        id: FormatId::Lum,
        total_blocks: 2,
        coefficient_blocks: 1,
        plain_color_channels: 2,
        stream_count: 0,
        name: "PTM_FORMAT_LUM",
    },
];

impl FormatDescriptor {
    /// Resolve a format by its header name, e.g. `PTM_FORMAT_JPEG_RGB`.
    pub fn lookup(name: &str) -> Result<&'static FormatDescriptor> {
        FORMATS
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| PtmError::UnsupportedFormat(name.to_string()))
    }

    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.stream_count > 0
    }

    pub fn color_layout(&self) -> ColorLayout {
        match self.plain_color_channels {
            0 => ColorLayout::Rgb,
            2 => ColorLayout::Lum,
            _ => ColorLayout::Lrgb,
        }
    }

    /// Bytes per pixel of block `block` in memory.
    #[inline]
    pub fn sample_size(&self, block: usize) -> usize {
        if block < self.coefficient_blocks {
            PTM_COEFFICIENTS
        } else {
            COLOR_SAMPLE_SIZE
        }
    }

    /// Bytes per pixel of block `block` in an uncompressed file.
    #[inline]
    pub fn wire_sample_size(&self, block: usize) -> usize {
        if block < self.coefficient_blocks {
            PTM_COEFFICIENTS
        } else {
            self.plain_color_channels
        }
    }
}
