mod jpeg;
mod passthrough;
mod photo;

pub use jpeg::JpegPlaneCodec;
pub use passthrough::RawPlaneCodec;
pub use photo::{encode_rendered_jpeg, load_captures, load_photo};

use ptm_core::{FormatDescriptor, PlaneCodec};
use std::sync::Arc;

/// The codec a standard PTM of `format` uses for its streams.
///
/// Uncompressed formats never touch a codec; they get the raw one.
pub fn codec_for_format(format: &FormatDescriptor) -> Arc<dyn PlaneCodec> {
    if format.is_compressed() {
        Arc::new(JpegPlaneCodec)
    } else {
        Arc::new(RawPlaneCodec)
    }
}
