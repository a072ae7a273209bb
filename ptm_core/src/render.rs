use rayon::prelude::*;

use crate::blocks::Blocks;
use crate::fit::light_terms;
use crate::format::{ColorLayout, COLOR_SAMPLE_SIZE, PTM_COEFFICIENTS};
use crate::header::Header;
use crate::photo::{clip_u8, ColorSpace, RenderedImage};
use crate::quantize::ScaleBias;

/// Relight the PTM from direction `(u, v)`.
///
/// Output rows run top-down, so row 0 of the result is the last stored row.
/// RGB and LRGB formats render RGB; LUM renders YCbCr with the stored chroma.
pub fn render(header: &Header, blocks: &Blocks, u: f32, v: f32) -> RenderedImage {
    let (width, height) = (header.width, header.height);
    let light = light_terms(u, v);
    let sb = header.scale_bias();
    let layout = header.format.color_layout();

    let mut pixels = vec![0u8; width * height * 3];
    pixels
        .par_chunks_mut((width * 3).max(1))
        .enumerate()
        .for_each(|(y, out)| {
            let stored_row = height - 1 - y;
            let coeff_row = |b: usize| {
                let stride = width * PTM_COEFFICIENTS;
                &blocks.block(b)[stored_row * stride..(stored_row + 1) * stride]
            };
            let color_row = || {
                let stride = width * COLOR_SAMPLE_SIZE;
                &blocks.block(1)[stored_row * stride..(stored_row + 1) * stride]
            };

            match layout {
                ColorLayout::Rgb => {
                    let rows = [coeff_row(0), coeff_row(1), coeff_row(2)];
                    for (x, px) in out.chunks_exact_mut(3).enumerate() {
                        for (c, row) in rows.iter().enumerate() {
                            px[c] = clip_u8(evaluate(&row[x * PTM_COEFFICIENTS..], &sb, &light));
                        }
                    }
                }
                ColorLayout::Lrgb => {
                    let (lum, rgb) = (coeff_row(0), color_row());
                    for (x, px) in out.chunks_exact_mut(3).enumerate() {
                        let l = evaluate(&lum[x * PTM_COEFFICIENTS..], &sb, &light) / 255.0;
                        for c in 0..3 {
                            px[c] = clip_u8(l * rgb[x * COLOR_SAMPLE_SIZE + c] as f32);
                        }
                    }
                }
                ColorLayout::Lum => {
                    let (lum, chroma) = (coeff_row(0), color_row());
                    for (x, px) in out.chunks_exact_mut(3).enumerate() {
                        px[0] = clip_u8(evaluate(&lum[x * PTM_COEFFICIENTS..], &sb, &light));
                        px[1] = chroma[x * COLOR_SAMPLE_SIZE];
                        px[2] = chroma[x * COLOR_SAMPLE_SIZE + 1];
                    }
                }
            }
        });

    RenderedImage {
        width,
        height,
        color_space: match layout {
            ColorLayout::Lum => ColorSpace::YCbCr,
            _ => ColorSpace::Rgb,
        },
        pixels,
    }
}

/// Dequantize one stored coefficient sample and evaluate it under `light`.
#[inline]
fn evaluate(sample: &[u8], sb: &ScaleBias, light: &[f32; PTM_COEFFICIENTS]) -> f32 {
    sb.unscale(sample)
        .iter()
        .zip(light)
        .map(|(c, l)| c * l)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatId;
    use crate::quantize::dequantize;

    #[test]
    fn lum_copies_chroma_and_flips_rows() {
        let mut h = Header::new(FormatId::Lum.descriptor(), 1, 2);
        h.scale = [1.0; 6];
        let mut blocks = Blocks::allocate(&h);
        // stored row 0: c1 = 10, row 1: c1 = 20
        blocks.block_mut(0)[5] = 10;
        blocks.block_mut(0)[11] = 20;
        blocks.block_mut(1).copy_from_slice(&[100, 110, 0, 120, 130, 0]);

        let img = render(&h, &blocks, 0.4, -0.2);
        assert_eq!(img.color_space, ColorSpace::YCbCr);
        assert_eq!(img.pixels, vec![20, 120, 130, 10, 100, 110]);
    }

    #[test]
    fn lrgb_modulates_color_by_luminance() {
        let mut h = Header::new(FormatId::Lrgb.descriptor(), 1, 1);
        h.scale = [2.0; 6];
        h.bias = [0; 6];
        let mut blocks = Blocks::allocate(&h);
        // c1 dequantizes to 2 * 51 = 102, so L / 255 = 0.4
        blocks.block_mut(0)[5] = 51;
        blocks.block_mut(1).copy_from_slice(&[200, 100, 10]);

        let img = render(&h, &blocks, 0.0, 0.0);
        assert_eq!(img.pixels, vec![80, 40, 4]);
        assert_eq!(dequantize(51, 2.0, 0), 102.0);
    }
}
