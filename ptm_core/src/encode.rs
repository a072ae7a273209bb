use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::blocks::Blocks;
use crate::error::{PtmError, Result};
use crate::fit::{self, PseudoInverse, UnscaledCoefficients};
use crate::format::{ColorLayout, FormatDescriptor, FormatId, DEFAULT_QUALITY, MIN_LIGHTS};
use crate::header::Header;
use crate::lights::LightSample;
use crate::photo::{ycbcr_to_rgb, ColorSpace, Photo};
use crate::quantize::{compute_scale_bias, quantize_into};

/// Knobs for building a PTM from photographs.
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    pub format: &'static FormatDescriptor,
    /// Plane codec quality (0–100); ignored by uncompressed formats.
    pub quality: u8,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            format: FormatId::JpegRgb.descriptor(),
            quality: DEFAULT_QUALITY as u8,
        }
    }
}

/// One decoded input photograph and the light it was taken under.
#[derive(Debug, Clone)]
pub struct Capture {
    pub photo: Photo,
    pub light: LightSample,
}

/// Color space the fitter wants photographs in for `format`.
pub fn input_color_space(format: &FormatDescriptor) -> ColorSpace {
    match format.color_layout() {
        ColorLayout::Rgb => ColorSpace::Rgb,
        ColorLayout::Lrgb | ColorLayout::Lum => ColorSpace::YCbCr,
    }
}

/// Fit, quantize, and lay out a PTM from `captures`.
///
/// The returned header has scale, bias, and quality set; the stream table is
/// filled in when the PTM is written.
pub fn encode(captures: Vec<Capture>, options: &EncodeOptions) -> Result<(Header, Blocks)> {
    if captures.len() < MIN_LIGHTS {
        return Err(PtmError::InsufficientSamples {
            found: captures.len(),
            required: MIN_LIGHTS,
        });
    }
    let format = options.format;
    let t0 = Instant::now();

    let lights: Vec<LightSample> = captures.iter().map(|c| c.light).collect();
    let target = input_color_space(format);
    let photos: Vec<Photo> = captures
        .into_par_iter()
        .map(|c| c.photo.into_color_space(target))
        .collect();
    let (width, height) = fit::check_dimensions(&photos)?;

    // The pseudo-inverse is shared by every pixel and must exist before any fit.
    let pinv = PseudoInverse::from_lights(&lights)?;

    let mut header = Header::new(format, width, height);
    header.quality = options.quality.min(100) as i32;
    let mut blocks = Blocks::allocate(&header);

    let coefficients: Vec<Vec<UnscaledCoefficients>> = match format.color_layout() {
        ColorLayout::Rgb => (0..format.coefficient_blocks)
            .map(|channel| fit::fit_channel(&photos, channel, &pinv))
            .collect(),
        ColorLayout::Lum => {
            let luma = fit::fit_channel(&photos, 0, &pinv);
            let mean = fit::average_channels(&photos);
            // Color block keeps (Cb, Cr); the third slot stays zero.
            for (dst, ycc) in blocks.block_mut(1).chunks_exact_mut(3).zip(mean.chunks_exact(3)) {
                dst[0] = ycc[1];
                dst[1] = ycc[2];
            }
            vec![luma]
        }
        ColorLayout::Lrgb => {
            let mut luma = fit::fit_channel(&photos, 0, &pinv);
            let mean = fit::average_channels(&photos);
            // Store the mean color as RGB and rescale the luma polynomial so
            // that L / 255 * R reproduces R under average lighting.
            let color = blocks.block_mut(1);
            for ((dst, ycc), coeffs) in color
                .chunks_exact_mut(3)
                .zip(mean.chunks_exact(3))
                .zip(luma.iter_mut())
            {
                dst.copy_from_slice(&ycbcr_to_rgb([ycc[0], ycc[1], ycc[2]]));
                *coeffs = coeffs.scaled(256.0 / ycc[0].max(1) as f32);
            }
            vec![luma]
        }
    };
    debug!(elapsed_ms = t0.elapsed().as_millis() as u64, "fitted polynomials");

    let sb = compute_scale_bias(&coefficients, width);
    header.set_scale_bias(&sb);
    for (b, coeffs) in coefficients.iter().enumerate() {
        quantize_into(&mut blocks, b, coeffs, &sb)?;
    }

    info!(
        format = format.name,
        width,
        height,
        lights = lights.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "encoded PTM"
    );
    Ok((header, blocks))
}
