//! Coefficient planes ⇄ independent grayscale codec streams.
//!
//! Compressed PTMs store every channel of every block as its own grayscale
//! image. Stream `i` is channel `i % 6` of block `i / 6`, so JPEG_RGB carries
//! 18 coefficient planes and JPEG_LRGB carries 6 luma coefficient planes
//! followed by the R, G, B planes of the color block.
//!
//! # Decode sequence
//! 1. Read each stream's compressed bytes and side info, in file order.
//! 2. Decode every stream to a plane (in parallel).
//! 3. For step `0..n`, take the plane scheduled at that step by `order`, add
//!    its reference plane (inverted if flagged) minus 128, then apply its
//!    side info.
//! 4. Interleave every plane back into its block.

use std::io::{self, Read};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::blocks::Blocks;
use crate::codec::{PlaneCodec, SideInfo};
use crate::error::{PtmError, Result};
use crate::format::PTM_COEFFICIENTS;
use crate::header::{Header, StreamTable};

/// Block and channel that stream `stream` maps to.
#[inline]
pub fn stream_target(stream: usize) -> (usize, usize) {
    (stream / PTM_COEFFICIENTS, stream % PTM_COEFFICIENTS)
}

/// One stream as read from the file, before decoding.
struct RawStream {
    compressed: Vec<u8>,
    side_info: SideInfo,
}

/// Read and decode the compressed payload described by `header` into `blocks`.
pub fn decode_streams<R: Read>(
    input: &mut R,
    header: &Header,
    blocks: &mut Blocks,
    codec: &dyn PlaneCodec,
) -> Result<()> {
    let n = header.format.stream_count;
    let table = &header.streams;
    table.validate(n)?;
    let (width, height) = (header.width, header.height);

    // ── 1. sequential read ──────────────────────────────────────────────────
    let mut raw = Vec::with_capacity(n);
    for i in 0..n {
        let compressed = read_exact_vec(input, table.compressed_sizes[i], "stream", i)?;
        let side = read_exact_vec(input, table.side_info_sizes[i], "side info", i)?;
        raw.push(RawStream {
            compressed,
            side_info: SideInfo { bytes: side },
        });
    }

    // ── 2. parallel decode ──────────────────────────────────────────────────
    let t0 = Instant::now();
    let mut planes: Vec<Vec<u8>> = raw
        .par_iter()
        .enumerate()
        .map(|(i, s)| {
            if s.compressed.is_empty() {
                warn!(stream = i, "zero-length stream, plane left empty");
                return Ok(vec![0u8; width * height]);
            }
            codec.decompress_plane(&s.compressed, width, height)
        })
        .collect::<Result<_>>()?;
    debug!(
        streams = n,
        codec = codec.name(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "decoded streams"
    );

    // ── 3. prediction and side info ─────────────────────────────────────────
    for step in 0..n {
        let plane = table.order_to_component(step)?;
        if let Some(reference) = table.reference_of(plane) {
            let source = planes[reference].clone();
            combine(&mut planes[plane], &source, table.inverts_reference(plane));
        }
        let side = &raw[plane].side_info;
        if !side.is_empty() {
            side.apply(&mut planes[plane]);
        }
    }

    // ── 4. demultiplex ──────────────────────────────────────────────────────
    for (i, plane) in planes.iter().enumerate() {
        let (block, channel) = stream_target(i);
        blocks.plane_mut(block, channel)?.fill_from(plane)?;
    }
    Ok(())
}

/// Add a reference plane, centred on 128, to a predicted plane.
fn combine(dest: &mut [u8], reference: &[u8], invert: bool) {
    for (d, &r) in dest.iter_mut().zip(reference) {
        let r = if invert { 255 - r } else { r };
        // r - 128 is always within i8 range.
        *d = d.wrapping_add_signed((r as i16 - 128) as i8);
    }
}

/// Read `len` bytes without trusting `len` for the allocation: the buffer only
/// grows as bytes actually arrive.
fn read_exact_vec<R: Read>(input: &mut R, len: u64, what: &str, stream: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    input.by_ref().take(len).read_to_end(&mut buf)?;
    if (buf.len() as u64) < len {
        return Err(PtmError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("{what} {stream} declares {len} bytes, only {} present", buf.len()),
        )));
    }
    Ok(buf)
}

/// Compress every plane of `blocks` and record the stream table in `header`.
///
/// Returns the compressed streams in file order. The table written is the
/// identity one: no prediction, no motion, no side info.
pub fn encode_streams(
    header: &mut Header,
    blocks: &Blocks,
    codec: &dyn PlaneCodec,
) -> Result<Vec<Vec<u8>>> {
    let n = header.format.stream_count;
    let (width, height) = (header.width, header.height);
    let quality = header.quality.clamp(0, 100) as u8;

    let t0 = Instant::now();
    let streams: Vec<Vec<u8>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let (block, channel) = stream_target(i);
            let plane = blocks.plane(block, channel)?.to_vec();
            codec.compress_plane(&plane, width, height, quality)
        })
        .collect::<Result<_>>()?;
    debug!(
        streams = n,
        codec = codec.name(),
        quality,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "compressed streams"
    );

    let mut table = StreamTable::identity(n);
    table.compressed_sizes = streams.iter().map(|s| s.len() as u64).collect();
    header.streams = table;
    Ok(streams)
}
