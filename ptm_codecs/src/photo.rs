use std::io::Write;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use ptm_core::{Capture, ColorSpace, LightEntry, Photo, RenderedImage, Result};
use rayon::prelude::*;
use tracing::debug;

use crate::jpeg::image_error;

/// Decode an input photograph into a bottom-up 3-channel buffer in `color_space`.
pub fn load_photo(path: impl AsRef<Path>, color_space: ColorSpace) -> Result<Photo> {
    let path = path.as_ref();
    let rgb = image::open(path).map_err(image_error)?.into_rgb8();
    let (w, h) = rgb.dimensions();
    debug!(path = ?path, width = w, height = h, "loaded photo");
    Ok(Photo::from_top_down(w as usize, h as usize, ColorSpace::Rgb, rgb.into_raw())?
        .into_color_space(color_space))
}

/// Load every photograph named in a light list, in list order.
pub fn load_captures(entries: &[LightEntry], color_space: ColorSpace) -> Result<Vec<Capture>> {
    entries
        .par_iter()
        .map(|entry| -> Result<Capture> {
            Ok(Capture {
                photo: load_photo(&entry.path, color_space)?,
                light: entry.light,
            })
        })
        .collect()
}

/// Encode a rendered image as an RGB JPEG. YCbCr renders are converted first.
pub fn encode_rendered_jpeg<W: Write>(image: &RenderedImage, quality: u8, out: W) -> Result<()> {
    let rgb = image.to_rgb();
    JpegEncoder::new_with_quality(out, quality.clamp(1, 100))
        .encode(&rgb, image.width as u32, image.height as u32, ExtendedColorType::Rgb8)
        .map_err(image_error)
}
