use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageError, ImageFormat};
use ptm_core::{PlaneCodec, PtmError, Result};

/// Baseline grayscale JPEG, one image per plane.
///
/// Quality follows libjpeg's 1–100 scale; 0 is raised to 1. Decoding accepts
/// any JPEG the `image` crate can read and reduces it to 8-bit luma.
pub struct JpegPlaneCodec;

impl PlaneCodec for JpegPlaneCodec {
    fn name(&self) -> &'static str {
        "jpeg"
    }

    fn compress_plane(
        &self,
        plane: &[u8],
        width: usize,
        height: usize,
        quality: u8,
    ) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
            .encode(plane, width as u32, height as u32, ExtendedColorType::L8)
            .map_err(image_error)?;
        Ok(out)
    }

    fn decompress_plane(&self, compressed: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
        let decoded = image::load_from_memory_with_format(compressed, ImageFormat::Jpeg)
            .map_err(image_error)?
            .into_luma8();
        let (w, h) = decoded.dimensions();
        if (w as usize, h as usize) != (width, height) {
            return Err(PtmError::MalformedStream(format!(
                "JPEG plane is {w}x{h}, expected {width}x{height}"
            )));
        }
        Ok(decoded.into_raw())
    }
}

/// Keep I/O failures as I/O; everything else the image crate reports is a
/// codec failure.
pub(crate) fn image_error(e: ImageError) -> PtmError {
    match e {
        ImageError::IoError(io) => PtmError::Io(io),
        other => PtmError::Codec(other.to_string()),
    }
}
