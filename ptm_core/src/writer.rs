use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::blocks::Blocks;
use crate::codec::PlaneCodec;
use crate::error::Result;
use crate::header::Header;
use crate::multiplex::encode_streams;

/// Serialize a PTM to `out`.
///
/// Compressed formats run every plane through `codec` first, because the
/// header records each stream's compressed length. `header.streams` is
/// rewritten with the table actually emitted.
pub fn write_ptm<W: Write>(
    out: &mut W,
    header: &mut Header,
    blocks: &Blocks,
    codec: &dyn PlaneCodec,
) -> Result<u64> {
    let mut written = 0u64;
    if header.format.is_compressed() {
        let streams = encode_streams(header, blocks, codec)?;
        let head = header.to_bytes()?;
        out.write_all(&head)?;
        written += head.len() as u64;
        for s in &streams {
            out.write_all(s)?;
            written += s.len() as u64;
        }
    } else {
        let head = header.to_bytes()?;
        out.write_all(&head)?;
        blocks.write_uncompressed(out)?;
        written += head.len() as u64;
        written += (0..blocks.len())
            .map(|b| (blocks.pixels() * header.format.wire_sample_size(b)) as u64)
            .sum::<u64>();
    }
    out.flush()?;
    Ok(written)
}

/// File writer that never leaves a partial PTM behind.
///
/// # Write contract
/// [`create`] opens a temporary sibling `<name>.partial`. [`write`] serializes
/// into it. [`finish`] flushes and renames it onto the final path. If the
/// writer is dropped before `finish` succeeds, the temporary file is removed.
///
/// [`create`]: PtmWriter::create
/// [`write`]: PtmWriter::write
/// [`finish`]: PtmWriter::finish
pub struct PtmWriter {
    file: Option<BufWriter<File>>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    bytes_written: u64,
}

impl PtmWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let final_path = path.as_ref().to_path_buf();
        let mut tmp_name: OsString = final_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("out.ptm"));
        tmp_name.push(".partial");
        let tmp_path = final_path.with_file_name(tmp_name);

        let file = File::create(&tmp_path)?;
        Ok(Self {
            file: Some(BufWriter::new(file)),
            tmp_path,
            final_path,
            bytes_written: 0,
        })
    }

    /// Serialize the PTM into the temporary file.
    pub fn write(&mut self, header: &mut Header, blocks: &Blocks, codec: &dyn PlaneCodec) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            self.bytes_written += write_ptm(file, header, blocks, codec)?;
        }
        Ok(())
    }

    /// Move the finished file into place. Returns the number of bytes written.
    pub fn finish(mut self) -> Result<u64> {
        if let Some(file) = self.file.take() {
            let file = file.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&self.tmp_path, &self.final_path)?;
        debug!(path = ?self.final_path, bytes = self.bytes_written, "wrote PTM");
        // Renamed: nothing left for Drop to clean up.
        self.tmp_path = PathBuf::new();
        Ok(self.bytes_written)
    }
}

impl Drop for PtmWriter {
    fn drop(&mut self) {
        if !self.tmp_path.as_os_str().is_empty() {
            self.file.take();
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

/// Write a complete PTM file at `path` through a [`PtmWriter`].
pub fn write_ptm_file(
    path: impl AsRef<Path>,
    header: &mut Header,
    blocks: &Blocks,
    codec: &dyn PlaneCodec,
) -> Result<u64> {
    let mut writer = PtmWriter::create(path)?;
    writer.write(header, blocks, codec)?;
    writer.finish()
}
