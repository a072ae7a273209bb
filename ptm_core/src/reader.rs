use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use tracing::debug;

use crate::blocks::Blocks;
use crate::codec::PlaneCodec;
use crate::error::Result;
use crate::header::Header;
use crate::multiplex::decode_streams;
use crate::photo::RenderedImage;
use crate::render::render;

/// A fully decoded PTM: header plus uncompressed blocks.
///
/// # Read sequence
/// 1. Parse the text header (magic, format, dimensions, scale/bias, stream table).
/// 2. Allocate blocks for the format and dimensions.
/// 3. Uncompressed formats: read each block raw. Compressed formats: read
///    every stream, decode it with the plane codec, and demultiplex.
///
/// Once read, the PTM can be rendered any number of times.
#[derive(Debug, Clone)]
pub struct Ptm {
    pub header: Header,
    pub blocks: Blocks,
}

impl Ptm {
    /// Read a PTM from any buffered source.
    ///
    /// `codec` decodes the planes of compressed formats and is unused otherwise.
    pub fn read_from<R: BufRead>(input: &mut R, codec: &dyn PlaneCodec) -> Result<Self> {
        let header = Header::read_from(input)?;
        debug!(
            format = header.format.name,
            width = header.width,
            height = header.height,
            "read PTM header"
        );

        Self::read_payload(header, input, codec)
    }

    /// Read the payload that follows an already parsed `header`.
    ///
    /// Lets callers choose the plane codec from `header.format` before any
    /// stream is decoded.
    pub fn read_payload<R: Read>(
        header: Header,
        input: &mut R,
        codec: &dyn PlaneCodec,
    ) -> Result<Self> {
        let mut blocks = Blocks::allocate(&header);
        if header.format.is_compressed() {
            decode_streams(input, &header, &mut blocks, codec)?;
        } else {
            blocks.read_uncompressed(input)?;
        }
        Ok(Self { header, blocks })
    }

    /// Open and read a PTM file.
    pub fn open(path: impl AsRef<Path>, codec: &dyn PlaneCodec) -> Result<Self> {
        let mut input = BufReader::new(File::open(path)?);
        Self::read_from(&mut input, codec)
    }

    /// Relight from `(u, v)`.
    pub fn render(&self, u: f32, v: f32) -> RenderedImage {
        render(&self.header, &self.blocks, u, v)
    }
}

/// Open and fully decode the PTM at `path`.
pub fn read_ptm(path: impl AsRef<Path>, codec: &dyn PlaneCodec) -> Result<Ptm> {
    Ptm::open(path, codec)
}
