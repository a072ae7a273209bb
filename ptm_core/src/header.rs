use std::io::{BufRead, Write};

use serde::Serialize;

use crate::error::{PtmError, Result};
use crate::format::{FormatDescriptor, DEFAULT_QUALITY, MAGIC, PTM_COEFFICIENTS};
use crate::quantize::ScaleBias;

// ── Stream table ────────────────────────────────────────────────────────────

/// Per-stream bookkeeping carried by compressed PTMs.
///
/// Every array holds exactly `format.stream_count` entries. Index `i` refers to
/// the `i`-th stream in file order, which is also coefficient plane `i`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamTable {
    /// Bit 0 set: the reference plane is inverted before prediction.
    pub transforms: Vec<i32>,
    pub motion_x: Vec<i32>,
    pub motion_y: Vec<i32>,
    /// `order[plane]` is the step at which `plane` is corrected.
    pub order: Vec<i32>,
    /// `-1`, or the plane this plane was predicted from.
    pub reference_planes: Vec<i32>,
    pub compressed_sizes: Vec<u64>,
    pub side_info_sizes: Vec<u64>,
}

impl StreamTable {
    /// The table this crate's encoder writes: identity order, no prediction,
    /// no motion, no side info. Sizes are filled in after compression.
    pub fn identity(streams: usize) -> Self {
        Self {
            transforms: vec![0; streams],
            motion_x: vec![0; streams],
            motion_y: vec![0; streams],
            order: (0..streams as i32).collect(),
            reference_planes: vec![-1; streams],
            compressed_sizes: vec![0; streams],
            side_info_sizes: vec![0; streams],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The plane corrected at step `step`, i.e. the index `j` with `order[j] == step`.
    pub fn order_to_component(&self, step: usize) -> Result<usize> {
        self.order
            .iter()
            .position(|&o| o >= 0 && o as usize == step)
            .ok_or_else(|| {
                PtmError::MalformedStream(format!("no plane is scheduled at order position {step}"))
            })
    }

    /// The reference plane of `plane`, if it was predicted.
    #[inline]
    pub fn reference_of(&self, plane: usize) -> Option<usize> {
        let r = self.reference_planes[plane];
        (r >= 0).then_some(r as usize)
    }

    /// Whether the reference of `plane` is inverted before it is added.
    #[inline]
    pub fn inverts_reference(&self, plane: usize) -> bool {
        self.transforms[plane] & 1 != 0
    }

    /// Check array lengths, reference ranges, and that references are acyclic.
    pub fn validate(&self, streams: usize) -> Result<()> {
        let lengths = [
            self.transforms.len(),
            self.motion_x.len(),
            self.motion_y.len(),
            self.order.len(),
            self.reference_planes.len(),
            self.compressed_sizes.len(),
            self.side_info_sizes.len(),
        ];
        if lengths.iter().any(|&l| l != streams) {
            return Err(PtmError::MalformedStream(format!(
                "stream table arrays must all have {streams} entries, got {lengths:?}"
            )));
        }

        for (plane, &r) in self.reference_planes.iter().enumerate() {
            if r < -1 || r >= streams as i32 {
                return Err(PtmError::MalformedStream(format!(
                    "plane {plane} references plane {r}, outside [-1, {streams})"
                )));
            }
        }

        // Each plane has at most one reference, so following the chain for
        // more than `streams` hops means we are going around a cycle.
        for start in 0..streams {
            let mut plane = start;
            let mut hops = 0;
            while let Some(next) = self.reference_of(plane) {
                hops += 1;
                if hops > streams {
                    return Err(PtmError::MalformedStream(format!(
                        "reference planes form a cycle through plane {start}"
                    )));
                }
                plane = next;
            }
        }
        Ok(())
    }
}

// ── Header ──────────────────────────────────────────────────────────────────

/// Decoded PTM header.
///
/// # Wire layout
/// ```text
/// PTM_1.2
/// <format name>
/// <width>
/// <height>
/// <scale × 6, "%f">
/// <bias × 6>
/// ── compressed formats only ──
/// <quality>
/// <transforms × n>
/// <motion_x × n>
/// <motion_y × n>
/// <order × n>
/// <reference_planes × n>
/// <compressed_sizes × n>
/// <side_info_sizes × n>
/// ```
/// Values on a line are separated by single spaces; every line ends in `\n`.
/// The binary payload starts right after the final newline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    pub format: &'static FormatDescriptor,
    pub width: usize,
    pub height: usize,
    pub scale: [f32; PTM_COEFFICIENTS],
    pub bias: [i32; PTM_COEFFICIENTS],
    pub quality: i32,
    pub streams: StreamTable,
}

impl Header {
    pub fn new(format: &'static FormatDescriptor, width: usize, height: usize) -> Self {
        Self {
            format,
            width,
            height,
            scale: [1.0; PTM_COEFFICIENTS],
            bias: [0; PTM_COEFFICIENTS],
            quality: DEFAULT_QUALITY,
            streams: StreamTable::identity(format.stream_count),
        }
    }

    #[inline]
    pub fn pixels(&self) -> usize {
        self.width * self.height
    }

    pub fn scale_bias(&self) -> ScaleBias {
        ScaleBias {
            scale: self.scale,
            bias: self.bias,
        }
    }

    pub fn set_scale_bias(&mut self, sb: &ScaleBias) {
        self.scale = sb.scale;
        self.bias = sb.bias;
    }

    /// Quality to use for JPEG output derived from this file.
    pub fn output_quality(&self) -> u8 {
        self.quality.clamp(1, 100) as u8
    }

    /// Serialize the header text.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "{MAGIC}")?;
        writeln!(out, "{}", self.format.name)?;
        // Width and height go on separate lines; some viewers insist on it.
        writeln!(out, "{}", self.width)?;
        writeln!(out, "{}", self.height)?;
        write_line(out, self.scale.iter().map(|s| format!("{s:.6}")))?;
        write_line(out, self.bias.iter())?;

        if self.format.is_compressed() {
            self.streams.validate(self.format.stream_count)?;
            let s = &self.streams;
            writeln!(out, "{}", self.quality)?;
            write_line(out, s.transforms.iter())?;
            write_line(out, s.motion_x.iter())?;
            write_line(out, s.motion_y.iter())?;
            write_line(out, s.order.iter())?;
            write_line(out, s.reference_planes.iter())?;
            write_line(out, s.compressed_sizes.iter())?;
            write_line(out, s.side_info_sizes.iter())?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    /// Parse a header, leaving `input` positioned at the first payload byte.
    pub fn read_from<R: BufRead>(input: &mut R) -> Result<Self> {
        let mut tokens = Tokens { input };

        match tokens.line()? {
            Some(line) if line == MAGIC => {}
            _ => return Err(PtmError::NotAPtmFile),
        }
        let name = tokens
            .line()?
            .ok_or_else(|| PtmError::InvalidHeader("missing format name".into()))?;
        let format = FormatDescriptor::lookup(&name)?;

        let width: usize = tokens.parse("width")?;
        let height: usize = tokens.parse("height")?;
        // Largest block is six bytes per pixel; its size must be addressable.
        width
            .checked_mul(height)
            .and_then(|pixels| pixels.checked_mul(PTM_COEFFICIENTS))
            .ok_or_else(|| {
                PtmError::InvalidHeader(format!("dimensions {width}x{height} are too large"))
            })?;

        let mut header = Header::new(format, width, height);
        for s in header.scale.iter_mut() {
            *s = tokens.parse("scale")?;
        }
        for b in header.bias.iter_mut() {
            *b = tokens.parse("bias")?;
        }

        if format.is_compressed() {
            let n = format.stream_count;
            header.quality = tokens.parse("compression quality")?;
            header.streams = StreamTable {
                transforms: tokens.parse_n(n, "transforms")?,
                motion_x: tokens.parse_n(n, "motion vector x")?,
                motion_y: tokens.parse_n(n, "motion vector y")?,
                order: tokens.parse_n(n, "order")?,
                reference_planes: tokens.parse_n(n, "reference planes")?,
                compressed_sizes: tokens.parse_n(n, "compressed sizes")?,
                side_info_sizes: tokens.parse_n(n, "side info sizes")?,
            };
            header.streams.validate(n)?;
        }

        tokens.end_of_line()?;
        Ok(header)
    }
}

fn write_line<W, I>(out: &mut W, values: I) -> Result<()>
where
    W: Write,
    I: IntoIterator,
    I::Item: std::fmt::Display,
{
    let mut first = true;
    for v in values {
        if !first {
            out.write_all(b" ")?;
        }
        write!(out, "{v}")?;
        first = false;
    }
    out.write_all(b"\n")?;
    Ok(())
}

// ── Tokenizer ───────────────────────────────────────────────────────────────

/// Whitespace tokenizer over the text part of a PTM.
///
/// Reads byte-wise through `fill_buf` so that nothing past the header is
/// consumed: the binary payload may begin with bytes that look like
/// whitespace.
struct Tokens<'a, R: BufRead> {
    input: &'a mut R,
}

impl<R: BufRead> Tokens<'_, R> {
    fn peek(&mut self) -> Result<Option<u8>> {
        Ok(self.input.fill_buf()?.first().copied())
    }

    /// One full line without its trailing whitespace; `None` at end of input.
    fn line(&mut self) -> Result<Option<String>> {
        let mut raw = Vec::new();
        if self.input.read_until(b'\n', &mut raw)? == 0 {
            return Ok(None);
        }
        let text = String::from_utf8_lossy(&raw);
        Ok(Some(text.trim_end().to_string()))
    }

    fn token(&mut self, field: &str) -> Result<String> {
        while let Some(b) = self.peek()? {
            if !b.is_ascii_whitespace() {
                break;
            }
            self.input.consume(1);
        }
        let mut tok = Vec::new();
        while let Some(b) = self.peek()? {
            if b.is_ascii_whitespace() {
                break;
            }
            tok.push(b);
            self.input.consume(1);
        }
        if tok.is_empty() {
            return Err(PtmError::InvalidHeader(format!(
                "unexpected end of header while reading {field}"
            )));
        }
        Ok(String::from_utf8_lossy(&tok).into_owned())
    }

    fn parse<T: std::str::FromStr>(&mut self, field: &str) -> Result<T> {
        let tok = self.token(field)?;
        tok.parse()
            .map_err(|_| PtmError::InvalidHeader(format!("bad value for {field}: {tok:?}")))
    }

    fn parse_n<T: std::str::FromStr>(&mut self, n: usize, field: &str) -> Result<Vec<T>> {
        (0..n).map(|_| self.parse(field)).collect()
    }

    /// Consume trailing blanks and the newline that ends the last header line.
    fn end_of_line(&mut self) -> Result<()> {
        while let Some(b) = self.peek()? {
            match b {
                b' ' | b'\t' | b'\r' => self.input.consume(1),
                b'\n' => {
                    self.input.consume(1);
                    break;
                }
                _ => break,
            }
        }
        Ok(())
    }
}
