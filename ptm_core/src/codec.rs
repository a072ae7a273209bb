use crate::error::Result;

/// Side information trailing a compressed plane.
///
/// A sequence of 5-byte records: a big-endian `u32` pixel offset followed by
/// the exact sample value for that pixel. It patches samples after lossy
/// decoding and prediction. Records whose offset falls outside the plane are
/// skipped; a trailing partial record is ignored.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct SideInfo {
    pub bytes: Vec<u8>,
}

impl SideInfo {
    const RECORD_SIZE: usize = 5;

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `(offset, sample)` pairs in file order.
    pub fn records(&self) -> impl Iterator<Item = (usize, u8)> + '_ {
        self.bytes.chunks_exact(Self::RECORD_SIZE).map(|r| {
            let offset = u32::from_be_bytes([r[0], r[1], r[2], r[3]]);
            (offset as usize, r[4])
        })
    }

    /// Overwrite the patched samples of `plane`.
    pub fn apply(&self, plane: &mut [u8]) {
        for (offset, sample) in self.records() {
            if let Some(p) = plane.get_mut(offset) {
                *p = sample;
            }
        }
    }
}

/// External single-channel image codec used for compressed PTM streams.
///
/// Each coefficient plane is compressed on its own; implementations must keep
/// no state between calls, which lets planes be processed in parallel.
pub trait PlaneCodec: Send + Sync {
    /// Human-readable codec name for CLI display.
    fn name(&self) -> &'static str;

    /// Compress a `width × height` 8-bit plane at `quality` (0–100).
    fn compress_plane(
        &self,
        plane: &[u8],
        width: usize,
        height: usize,
        quality: u8,
    ) -> Result<Vec<u8>>;

    /// Decompress a stream that must hold a `width × height` 8-bit plane.
    fn decompress_plane(&self, compressed: &[u8], width: usize, height: usize) -> Result<Vec<u8>>;
}
