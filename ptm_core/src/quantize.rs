//! Affine mapping between fitted float coefficients and stored bytes.
//!
//! For every coefficient index `c` the global range `[min, max]` over all
//! pixels (and all coefficient blocks) is squeezed into 0–255:
//!
//! ```text
//! scale = (max - min) / 256
//! bias  = round(-256 / (max - min) * min)
//! byte  = clip(value / scale + bias)
//! value = scale * (byte - bias)
//! ```

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::blocks::Blocks;
use crate::error::{PtmError, Result};
use crate::fit::UnscaledCoefficients;
use crate::format::PTM_COEFFICIENTS;
use crate::photo::clip_u8;

/// Per-coefficient scale and bias as stored in the header.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaleBias {
    pub scale: [f32; PTM_COEFFICIENTS],
    pub bias: [i32; PTM_COEFFICIENTS],
}

impl Default for ScaleBias {
    fn default() -> Self {
        Self {
            scale: [1.0; PTM_COEFFICIENTS],
            bias: [0; PTM_COEFFICIENTS],
        }
    }
}

/// Running per-coefficient minimum and maximum.
#[derive(Debug, Clone, Copy)]
struct Range {
    min: [f32; PTM_COEFFICIENTS],
    max: [f32; PTM_COEFFICIENTS],
}

impl Range {
    const EMPTY: Range = Range {
        min: [f32::MAX; PTM_COEFFICIENTS],
        max: [f32::MIN; PTM_COEFFICIENTS],
    };

    fn include(mut self, c: &UnscaledCoefficients) -> Self {
        for (i, v) in c.to_array().into_iter().enumerate() {
            self.min[i] = self.min[i].min(v);
            self.max[i] = self.max[i].max(v);
        }
        self
    }

    fn merge(mut self, other: Range) -> Self {
        for i in 0..PTM_COEFFICIENTS {
            self.min[i] = self.min[i].min(other.min[i]);
            self.max[i] = self.max[i].max(other.max[i]);
        }
        self
    }
}

/// Derive scale and bias from the global range of every coefficient.
///
/// Rows are reduced in parallel, each to a local range, and merged once.
/// A constant (or empty) channel gets `scale = 1, bias = 0`.
pub fn compute_scale_bias(planes: &[Vec<UnscaledCoefficients>], width: usize) -> ScaleBias {
    let range = planes
        .par_iter()
        .flat_map(|plane| plane.par_chunks(width.max(1)))
        .map(|row| row.iter().fold(Range::EMPTY, Range::include))
        .reduce(|| Range::EMPTY, Range::merge);

    let mut sb = ScaleBias::default();
    for i in 0..PTM_COEFFICIENTS {
        let span = range.max[i] - range.min[i];
        if span > 0.0 && span.is_finite() {
            sb.scale[i] = span / 256.0;
            sb.bias[i] = (-256.0 / span * range.min[i]).round() as i32;
        }
    }
    debug!(
        min = ?range.min,
        max = ?range.max,
        scale = ?sb.scale,
        bias = ?sb.bias,
        "coefficient ranges"
    );
    sb
}

#[inline]
pub fn quantize(value: f32, inv_scale: f32, bias: i32) -> u8 {
    clip_u8(value * inv_scale + bias as f32)
}

#[inline]
pub fn dequantize(byte: u8, scale: f32, bias: i32) -> f32 {
    scale * (byte as i32 - bias) as f32
}

impl ScaleBias {
    fn inv_scale(&self) -> [f32; PTM_COEFFICIENTS] {
        self.scale.map(|s| 1.0 / s)
    }

    /// Dequantize one stored 6-byte coefficient sample.
    #[inline]
    pub fn unscale(&self, sample: &[u8]) -> [f32; PTM_COEFFICIENTS] {
        let mut out = [0.0; PTM_COEFFICIENTS];
        for (i, o) in out.iter_mut().enumerate() {
            *o = dequantize(sample[i], self.scale[i], self.bias[i]);
        }
        out
    }
}

/// Quantize `coeffs` into coefficient block `block`, one row per task.
pub fn quantize_into(
    blocks: &mut Blocks,
    block: usize,
    coeffs: &[UnscaledCoefficients],
    sb: &ScaleBias,
) -> Result<()> {
    let width = blocks.width();
    if block >= blocks.format().coefficient_blocks || coeffs.len() != blocks.pixels() {
        return Err(PtmError::MalformedStream(format!(
            "cannot quantize {} coefficients into block {block}",
            coeffs.len()
        )));
    }
    let inv_scale = sb.inv_scale();
    let row_bytes = (width * PTM_COEFFICIENTS).max(1);

    blocks
        .block_mut(block)
        .par_chunks_mut(row_bytes)
        .zip(coeffs.par_chunks(width.max(1)))
        .for_each(|(dst, src)| {
            for (sample, c) in dst.chunks_exact_mut(PTM_COEFFICIENTS).zip(src) {
                for (i, v) in c.to_array().into_iter().enumerate() {
                    sample[i] = quantize(v, inv_scale[i], sb.bias[i]);
                }
            }
        });
    Ok(())
}
