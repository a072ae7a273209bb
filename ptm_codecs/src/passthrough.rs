use ptm_core::{PlaneCodec, PtmError, Result};

/// No-op plane codec: streams hold the raw `width * height` plane bytes.
///
/// Useful for:
/// - Verifying the stream multiplexer independently of JPEG loss.
/// - Hand-building streams with prediction and side info in tests.
pub struct RawPlaneCodec;

impl PlaneCodec for RawPlaneCodec {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn compress_plane(
        &self,
        plane: &[u8],
        _width: usize,
        _height: usize,
        _quality: u8,
    ) -> Result<Vec<u8>> {
        Ok(plane.to_vec())
    }

    fn decompress_plane(&self, compressed: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
        if compressed.len() != width * height {
            return Err(PtmError::MalformedStream(format!(
                "raw plane holds {} bytes, expected {width}x{height}",
                compressed.len()
            )));
        }
        Ok(compressed.to_vec())
    }
}
