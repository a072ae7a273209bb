//! Least-squares fitting of the per-pixel biquadratic.
//!
//! With N photographs lit from `(u_i, v_i)`, each pixel's samples `b` satisfy
//! `A·c ≈ b` where row `i` of `A` is `[u², v², uv, u, v, 1]`. The pseudo-inverse
//! `M = V·Σ⁻¹·Uᵗ` from a thin SVD of `A` depends only on the lights, so it is
//! computed once and every pixel's coefficients are `M·b`.

use nalgebra::DMatrix;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{PtmError, Result};
use crate::format::{MIN_LIGHTS, PTM_COEFFICIENTS};
use crate::lights::LightSample;
use crate::photo::Photo;

/// Iteration cap handed to the SVD; hitting it reports non-convergence.
const SVD_MAX_ITERATIONS: usize = 1000;

// ── Coefficients ────────────────────────────────────────────────────────────

/// Floating-point polynomial coefficients of one pixel, before quantization.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UnscaledCoefficients {
    pub cu2: f32,
    pub cv2: f32,
    pub cuv: f32,
    pub cu: f32,
    pub cv: f32,
    pub c1: f32,
}

impl UnscaledCoefficients {
    pub fn from_array([cu2, cv2, cuv, cu, cv, c1]: [f32; PTM_COEFFICIENTS]) -> Self {
        Self { cu2, cv2, cuv, cu, cv, c1 }
    }

    pub fn to_array(self) -> [f32; PTM_COEFFICIENTS] {
        [self.cu2, self.cv2, self.cuv, self.cu, self.cv, self.c1]
    }

    /// Evaluate the polynomial at light direction `(u, v)`.
    pub fn evaluate(&self, u: f32, v: f32) -> f32 {
        self.to_array()
            .iter()
            .zip(light_terms(u, v))
            .map(|(c, l)| c * l)
            .sum()
    }

    pub fn scaled(self, k: f32) -> Self {
        Self::from_array(self.to_array().map(|c| c * k))
    }
}

/// The monomials `[u², v², uv, u, v, 1]` for a light direction.
#[inline]
pub fn light_terms(u: f32, v: f32) -> [f32; PTM_COEFFICIENTS] {
    [u * u, v * v, u * v, u, v, 1.0]
}

// ── Pseudo-inverse ──────────────────────────────────────────────────────────

/// The 6×N least-squares operator shared by every pixel.
#[derive(Debug, Clone)]
pub struct PseudoInverse {
    /// Row-major, `PTM_COEFFICIENTS` rows of `n_lights` entries.
    m: Vec<f64>,
    n_lights: usize,
}

impl PseudoInverse {
    /// Build the design matrix for `lights` and invert it through a thin SVD.
    pub fn from_lights(lights: &[LightSample]) -> Result<Self> {
        let n = lights.len();
        if n < MIN_LIGHTS {
            return Err(PtmError::InsufficientSamples {
                found: n,
                required: MIN_LIGHTS,
            });
        }

        let a = DMatrix::<f64>::from_fn(n, PTM_COEFFICIENTS, |i, j| {
            light_terms(lights[i].u, lights[i].v)[j] as f64
        });
        let svd = a
            .try_svd(true, true, f64::EPSILON, SVD_MAX_ITERATIONS)
            .ok_or(PtmError::SvdDidNotConverge)?;

        let sigma = svd.singular_values.clone();
        let (u, v_t) = match (svd.u, svd.v_t) {
            (Some(u), Some(v_t)) => (u, v_t),
            _ => return Err(PtmError::SvdDidNotConverge),
        };
        debug!(singular_values = ?sigma.as_slice(), "light matrix SVD");

        // Directions the lights do not constrain get a zero inverse instead of
        // an infinite one.
        let tolerance = sigma.max() * f32::EPSILON as f64 * n as f64;
        let inv_sigma = sigma.map(|s| if s > tolerance { 1.0 / s } else { 0.0 });

        let m = v_t.transpose() * DMatrix::from_diagonal(&inv_sigma) * u.transpose();
        let m = &m;
        let rows = (0..PTM_COEFFICIENTS)
            .flat_map(|r| (0..n).map(move |c| m[(r, c)]))
            .collect();

        Ok(Self { m: rows, n_lights: n })
    }

    /// Coefficients fitting `samples` (one per light, in light order).
    pub fn apply(&self, samples: &[f32]) -> UnscaledCoefficients {
        let mut out = [0.0f32; PTM_COEFFICIENTS];
        for (o, row) in out.iter_mut().zip(self.m.chunks_exact(self.n_lights)) {
            let dot: f64 = row.iter().zip(samples).map(|(a, &b)| a * b as f64).sum();
            *o = dot as f32;
        }
        UnscaledCoefficients::from_array(out)
    }
}

// ── Per-pixel fitting ───────────────────────────────────────────────────────

/// Check that all photos share one size; returns `(width, height)`.
pub fn check_dimensions(photos: &[Photo]) -> Result<(usize, usize)> {
    let first = photos.first().ok_or(PtmError::InsufficientSamples {
        found: 0,
        required: MIN_LIGHTS,
    })?;
    let (width, height) = (first.width, first.height);
    for (index, p) in photos.iter().enumerate() {
        if p.width != width || p.height != height || p.pixels.len() != width * height * 3 {
            return Err(PtmError::DimensionMismatch {
                index,
                width,
                height,
                actual_width: p.width,
                actual_height: p.height,
            });
        }
    }
    Ok((width, height))
}

/// Fit channel `channel` of every pixel across `photos`, one row per task.
///
/// `photos` must be ordered like the lights `pinv` was built from and share
/// one size (see [`check_dimensions`]).
pub fn fit_channel(
    photos: &[Photo],
    channel: usize,
    pinv: &PseudoInverse,
) -> Vec<UnscaledCoefficients> {
    let Some(first) = photos.first() else {
        return Vec::new();
    };
    let width = first.width;
    let mut out = vec![UnscaledCoefficients::default(); first.width * first.height];

    out.par_chunks_mut(width.max(1))
        .enumerate()
        .for_each(|(y, row)| {
            let mut b = vec![0.0f32; photos.len()];
            for (x, coeffs) in row.iter_mut().enumerate() {
                let idx = (y * width + x) * 3 + channel;
                for (s, photo) in b.iter_mut().zip(photos) {
                    *s = photo.pixels[idx] as f32;
                }
                *coeffs = pinv.apply(&b);
            }
        });
    out
}

/// Per-pixel mean of all three channels across `photos`.
///
/// Used for the color block of LUM/LRGB: chroma is assumed roughly
/// light-invariant on diffuse surfaces. This is an approximation.
pub fn average_channels(photos: &[Photo]) -> Vec<u8> {
    let Some(first) = photos.first() else {
        return Vec::new();
    };
    let row_stride = first.width * 3;
    let n = photos.len() as u32;
    let mut out = vec![0u8; row_stride * first.height];

    out.par_chunks_mut(row_stride.max(1))
        .enumerate()
        .for_each(|(y, row)| {
            let mut sums = vec![0u32; row.len()];
            for photo in photos {
                let src = &photo.pixels[y * row_stride..(y + 1) * row_stride];
                for (s, &p) in sums.iter_mut().zip(src) {
                    *s += p as u32;
                }
            }
            for (o, s) in row.iter_mut().zip(sums) {
                *o = (s / n) as u8;
            }
        });
    out
}
