use std::io::{Read, Write};

use crate::error::{PtmError, Result};
use crate::format::FormatDescriptor;
use crate::header::Header;

/// In-memory pixel buffers of one PTM.
///
/// Block `b` holds `width * height * format.sample_size(b)` bytes, pixel
/// samples interleaved. Coefficient blocks carry six bytes per pixel
/// (`cu², cv², cuv, cu, cv, c1`); the color block always carries three, even
/// for LUM which only uses two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blocks {
    format: &'static FormatDescriptor,
    width: usize,
    height: usize,
    data: Vec<Vec<u8>>,
}

impl Blocks {
    /// Zero-filled blocks sized for `header`.
    pub fn allocate(header: &Header) -> Self {
        let format = header.format;
        let pixels = header.pixels();
        let data = (0..format.total_blocks)
            .map(|b| vec![0u8; pixels * format.sample_size(b)])
            .collect();
        Self {
            format,
            width: header.width,
            height: header.height,
            data,
        }
    }

    #[inline]
    pub fn format(&self) -> &'static FormatDescriptor {
        self.format
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn pixels(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn block(&self, b: usize) -> &[u8] {
        &self.data[b]
    }

    #[inline]
    pub fn block_mut(&mut self, b: usize) -> &mut [u8] {
        &mut self.data[b]
    }

    // ── Plane views ─────────────────────────────────────────────────────────

    /// A read-only view of channel `channel` of block `block`.
    pub fn plane(&self, block: usize, channel: usize) -> Result<PlaneView<'_>> {
        let stride = self.checked_stride(block, channel)?;
        Ok(PlaneView {
            data: &self.data[block],
            stride,
            offset: channel,
        })
    }

    /// A writable view of channel `channel` of block `block`.
    pub fn plane_mut(&mut self, block: usize, channel: usize) -> Result<PlaneViewMut<'_>> {
        let stride = self.checked_stride(block, channel)?;
        Ok(PlaneViewMut {
            data: &mut self.data[block],
            stride,
            offset: channel,
        })
    }

    fn checked_stride(&self, block: usize, channel: usize) -> Result<usize> {
        if block >= self.data.len() {
            return Err(PtmError::MalformedStream(format!(
                "block {block} does not exist in {}",
                self.format.name
            )));
        }
        let stride = self.format.sample_size(block);
        if channel >= stride || self.data[block].len() != self.pixels() * stride {
            return Err(PtmError::MalformedStream(format!(
                "channel {channel} is outside block {block} of {} ({stride} bytes per pixel)",
                self.format.name
            )));
        }
        Ok(stride)
    }

    // ── Raw I/O ─────────────────────────────────────────────────────────────

    /// Fill every block, in order, from an uncompressed payload.
    pub fn read_uncompressed<R: Read>(&mut self, input: &mut R) -> Result<()> {
        for b in 0..self.data.len() {
            let wire = self.format.wire_sample_size(b);
            let stride = self.format.sample_size(b);
            if wire == stride {
                input.read_exact(&mut self.data[b])?;
            } else {
                let mut raw = vec![0u8; self.pixels() * wire];
                input.read_exact(&mut raw)?;
                for (dst, src) in self.data[b].chunks_exact_mut(stride).zip(raw.chunks_exact(wire)) {
                    dst[..wire].copy_from_slice(src);
                }
            }
        }
        Ok(())
    }

    /// Write every block, in order, as an uncompressed payload.
    pub fn write_uncompressed<W: Write>(&self, out: &mut W) -> Result<()> {
        for b in 0..self.data.len() {
            let wire = self.format.wire_sample_size(b);
            let stride = self.format.sample_size(b);
            if wire == stride {
                out.write_all(&self.data[b])?;
            } else {
                let raw: Vec<u8> = self.data[b]
                    .chunks_exact(stride)
                    .flat_map(|px| &px[..wire])
                    .copied()
                    .collect();
                out.write_all(&raw)?;
            }
        }
        Ok(())
    }
}

// ── Views ───────────────────────────────────────────────────────────────────

/// One channel of an interleaved block, seen as a `width × height` plane.
///
/// Bounds are validated when the view is built.
pub struct PlaneView<'a> {
    data: &'a [u8],
    stride: usize,
    offset: usize,
}

impl PlaneView<'_> {
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.data.iter().skip(self.offset).step_by(self.stride).copied()
    }

    /// Deinterleave into a contiguous plane.
    pub fn to_vec(&self) -> Vec<u8> {
        self.iter().collect()
    }
}

pub struct PlaneViewMut<'a> {
    data: &'a mut [u8],
    stride: usize,
    offset: usize,
}

impl PlaneViewMut<'_> {
    /// Interleave a contiguous plane into the block.
    pub fn fill_from(&mut self, plane: &[u8]) -> Result<()> {
        let pixels = self.data.len() / self.stride;
        if plane.len() != pixels {
            return Err(PtmError::MalformedStream(format!(
                "plane has {} samples, block expects {pixels}",
                plane.len()
            )));
        }
        for (px, &v) in self.data.chunks_exact_mut(self.stride).zip(plane) {
            px[self.offset] = v;
        }
        Ok(())
    }
}
