/// Integration tests: whole PTM files through the writer and reader, plus the
/// encode pipeline from synthetic photographs.
///
/// Photographs are generated from known per-pixel polynomials, so a correct
/// fit, quantization, and file round trip must reproduce them when relit from
/// the same light directions.
use std::io::Cursor;

use ptm_codecs::{JpegPlaneCodec, RawPlaneCodec};
use ptm_core::fit::UnscaledCoefficients;
use ptm_core::{
    encode, read_ptm, write_ptm, write_ptm_file, Blocks, Capture, ColorSpace, EncodeOptions,
    FormatId, Header, LightSample, Photo, PlaneCodec, Ptm, PtmError, PtmWriter,
};

/// Generate `len` deterministic bytes using a simple LCG.
fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = seed;
    (0..len)
        .map(|_| {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (rng >> 56) as u8
        })
        .collect()
}

/// Deterministic floats in `[lo, hi)` from the same LCG.
fn pseudo_random_floats(len: usize, seed: u64, lo: f32, hi: f32) -> Vec<f32> {
    pseudo_random_bytes(len, seed)
        .into_iter()
        .map(|b| lo + (hi - lo) * b as f32 / 256.0)
        .collect()
}

// ── helpers ───────────────────────────────────────────────────────────────

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("ptm_test_{}_{}.ptm", name, std::process::id()))
}

/// Twelve lights on two interleaved rings.
fn ring_lights() -> Vec<LightSample> {
    (0..12)
        .map(|k| {
            let a = k as f32 * std::f32::consts::TAU / 12.0;
            let r = if k % 2 == 0 { 0.85 } else { 0.45 };
            LightSample::new(r * a.cos(), r * a.sin())
        })
        .collect()
}

/// One polynomial per pixel and channel (or per pixel when `gray`), with
/// values that stay inside `[0, 255]` for every light on the rings.
fn synthetic_polynomials(pixels: usize, gray: bool) -> Vec<UnscaledCoefficients> {
    let n = if gray { pixels } else { pixels * 3 };
    let cu2 = pseudo_random_floats(n, 1, -20.0, -5.0);
    let cv2 = pseudo_random_floats(n, 2, -20.0, -5.0);
    let cuv = pseudo_random_floats(n, 3, -5.0, 5.0);
    let cu = pseudo_random_floats(n, 4, -30.0, 30.0);
    let cv = pseudo_random_floats(n, 5, -30.0, 30.0);
    let c1 = pseudo_random_floats(n, 6, 90.0, 160.0);
    (0..n)
        .map(|i| UnscaledCoefficients::from_array([cu2[i], cv2[i], cuv[i], cu[i], cv[i], c1[i]]))
        .collect()
}

/// Photographs of the synthetic surface, as top-down RGB, one per ring light.
fn synthetic_photos(width: usize, height: usize, gray: bool) -> Vec<(LightSample, Vec<u8>)> {
    let polys = synthetic_polynomials(width * height, gray);
    ring_lights()
        .into_iter()
        .map(|light| {
            let mut pixels = Vec::with_capacity(width * height * 3);
            for p in 0..width * height {
                for c in 0..3 {
                    let poly = if gray { &polys[p] } else { &polys[p * 3 + c] };
                    pixels.push(poly.evaluate(light.u, light.v).round().clamp(0.0, 255.0) as u8);
                }
            }
            (light, pixels)
        })
        .collect()
}

fn captures_of(width: usize, height: usize, photos: &[(LightSample, Vec<u8>)]) -> Vec<Capture> {
    photos
        .iter()
        .map(|(light, pixels)| Capture {
            photo: Photo::from_top_down(width, height, ColorSpace::Rgb, pixels.clone()).unwrap(),
            light: *light,
        })
        .collect()
}

fn max_abs_diff(a: &[u8], b: &[u8]) -> u8 {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x.abs_diff(*y)).max().unwrap_or(0)
}

fn write_then_read(header: &mut Header, blocks: &Blocks, codec: &dyn PlaneCodec) -> Ptm {
    let mut buf = Vec::new();
    write_ptm(&mut buf, header, blocks, codec).unwrap();
    Ptm::read_from(&mut Cursor::new(buf), codec).unwrap()
}

/// Blocks filled with LCG bytes; the unused third color slot of LUM stays zero.
fn random_blocks(header: &Header, seed: u64) -> Blocks {
    let mut blocks = Blocks::allocate(header);
    for b in 0..header.format.total_blocks {
        let len = blocks.block(b).len();
        blocks
            .block_mut(b)
            .copy_from_slice(&pseudo_random_bytes(len, seed + b as u64));
    }
    if header.format.id == FormatId::Lum {
        for px in blocks.block_mut(1).chunks_exact_mut(3) {
            px[2] = 0;
        }
    }
    blocks
}

// ── file round trips ───────────────────────────────────────────────────────

#[test]
fn test_uncompressed_roundtrip_every_format() {
    for id in [FormatId::Rgb, FormatId::Lrgb, FormatId::Lum] {
        let mut header = Header::new(id.descriptor(), 7, 5);
        header.scale = [0.25, 0.5, 0.125, 1.5, 2.0, 0.75];
        header.bias = [128, 100, 0, -3, 64, 12];
        let blocks = random_blocks(&header, 11);

        let ptm = write_then_read(&mut header, &blocks, &RawPlaneCodec);
        assert_eq!(ptm.header, header, "{:?} header", id);
        assert_eq!(ptm.blocks, blocks, "{:?} blocks should be byte-exact", id);
    }
}

#[test]
fn test_lum_color_block_is_two_bytes_on_disk() {
    let mut header = Header::new(FormatId::Lum.descriptor(), 4, 3);
    let blocks = random_blocks(&header, 5);
    let mut buf = Vec::new();
    write_ptm(&mut buf, &mut header, &blocks, &RawPlaneCodec).unwrap();

    let head = header.to_bytes().unwrap().len();
    assert_eq!(buf.len(), head + 12 * 6 + 12 * 2);
}

#[test]
fn test_compressed_roundtrip_raw_codec_is_exact() {
    for id in [FormatId::JpegRgb, FormatId::JpegLrgb] {
        let mut header = Header::new(id.descriptor(), 9, 4);
        header.quality = 75;
        let blocks = random_blocks(&header, 29);

        let ptm = write_then_read(&mut header, &blocks, &RawPlaneCodec);
        assert_eq!(ptm.blocks, blocks, "{:?}", id);

        let n = id.descriptor().stream_count;
        assert_eq!(ptm.header.quality, 75);
        assert_eq!(ptm.header.streams.compressed_sizes, vec![36; n]);
        assert_eq!(ptm.header.streams.reference_planes, vec![-1; n]);
        assert_eq!(ptm.header.streams.order, (0..n as i32).collect::<Vec<_>>());
    }
}

#[test]
fn test_jpeg_constant_planes_survive_compression() {
    let mut header = Header::new(FormatId::JpegRgb.descriptor(), 16, 16);
    header.quality = 100;
    let mut blocks = Blocks::allocate(&header);
    for b in 0..3 {
        for sample in blocks.block_mut(b).chunks_exact_mut(6) {
            for (c, s) in sample.iter_mut().enumerate() {
                *s = 40 + (b * 6 + c) as u8 * 10;
            }
        }
    }
    let expected = ptm_core::render::render(&header, &blocks, 0.0, 0.0);

    let ptm = write_then_read(&mut header, &blocks, &JpegPlaneCodec);
    for b in 0..3 {
        assert!(max_abs_diff(ptm.blocks.block(b), blocks.block(b)) <= 1, "block {}", b);
    }
    let relit = ptm.render(0.0, 0.0);
    assert!(max_abs_diff(&relit.pixels, &expected.pixels) <= 2);
}

#[test]
fn test_render_at_origin_is_the_constant_term() {
    let mut header = Header::new(FormatId::Rgb.descriptor(), 1, 1);
    header.scale = [1.0, 1.0, 1.0, 1.0, 1.0, 0.5];
    header.bias = [0, 0, 0, 0, 0, 10];
    let mut blocks = Blocks::allocate(&header);
    for (b, c1) in [210u8, 110, 30].into_iter().enumerate() {
        blocks.block_mut(b).copy_from_slice(&[255, 17, 3, 99, 200, c1]);
    }

    let ptm = write_then_read(&mut header, &blocks, &RawPlaneCodec);
    let img = ptm.render(0.0, 0.0);
    assert_eq!(img.color_space, ColorSpace::Rgb);
    assert_eq!(img.pixels, vec![100, 50, 10]);
}

#[test]
fn test_prediction_and_side_info_follow_order() {
    let (w, h) = (2, 2);
    let mut header = Header::new(FormatId::JpegLrgb.descriptor(), w, h);
    let s = &mut header.streams;
    s.transforms[1] = 1;
    s.reference_planes[1] = 0;
    s.reference_planes[3] = 4;
    // plane 4 must be corrected before plane 3 predicts from it
    s.order[3] = 4;
    s.order[4] = 3;

    let raw: Vec<(Vec<u8>, Vec<u8>)> = vec![
        (vec![10, 200, 128, 0], vec![]),
        (vec![5, 5, 5, 5], vec![]),
        (vec![1, 2, 3, 4], vec![0, 0, 0, 2, 99]),
        (vec![128; 4], vec![]),
        (vec![100; 4], vec![0, 0, 0, 0, 7]),
        (vec![60, 61, 62, 63], vec![]),
        (vec![200, 201, 202, 203], vec![]),
        (vec![30; 4], vec![]),
        (vec![], vec![]),
    ];
    s.compressed_sizes = raw.iter().map(|(c, _)| c.len() as u64).collect();
    s.side_info_sizes = raw.iter().map(|(_, si)| si.len() as u64).collect();

    let mut file = header.to_bytes().unwrap();
    for (compressed, side) in &raw {
        file.extend_from_slice(compressed);
        file.extend_from_slice(side);
    }

    let ptm = Ptm::read_from(&mut Cursor::new(file), &RawPlaneCodec).unwrap();
    let plane = |b: usize, c: usize| ptm.blocks.plane(b, c).unwrap().to_vec();
    assert_eq!(plane(0, 0), vec![10, 200, 128, 0]);
    assert_eq!(plane(0, 1), vec![122, 188, 4, 132]);
    assert_eq!(plane(0, 2), vec![1, 2, 99, 4]);
    assert_eq!(plane(0, 4), vec![7, 100, 100, 100]);
    assert_eq!(plane(0, 3), vec![7, 100, 100, 100]);
    assert_eq!(plane(0, 5), vec![60, 61, 62, 63]);
    assert_eq!(plane(1, 0), vec![200, 201, 202, 203]);
    assert_eq!(plane(1, 1), vec![30; 4]);
    assert_eq!(plane(1, 2), vec![0; 4], "zero-length stream is an absent plane");
}

// ── file writer ────────────────────────────────────────────────────────────

#[test]
fn test_file_writer_renames_into_place() {
    let path = temp_path("writer");
    let mut header = Header::new(FormatId::Lrgb.descriptor(), 3, 3);
    let blocks = random_blocks(&header, 3);

    let written = write_ptm_file(&path, &mut header, &blocks, &RawPlaneCodec).unwrap();
    assert_eq!(written, std::fs::metadata(&path).unwrap().len());
    assert!(!path.with_file_name(format!(
        "{}.partial",
        path.file_name().unwrap().to_string_lossy()
    ))
    .exists());

    let ptm = read_ptm(&path, &RawPlaneCodec).unwrap();
    assert_eq!(ptm.blocks, blocks);
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_file_writer_dropped_leaves_nothing() {
    let path = temp_path("abandoned");
    let partial = path.with_file_name(format!(
        "{}.partial",
        path.file_name().unwrap().to_string_lossy()
    ));
    {
        let _w = PtmWriter::create(&path).unwrap();
        assert!(partial.exists());
    }
    assert!(!partial.exists());
    assert!(!path.exists());
}

// ── malformed input ────────────────────────────────────────────────────────

#[test]
fn test_bad_magic_is_not_a_ptm() {
    let err = Ptm::read_from(&mut Cursor::new(b"P6\n1 1\n255\n".to_vec()), &RawPlaneCodec)
        .unwrap_err();
    assert!(matches!(err, PtmError::NotAPtmFile), "{err}");
}

#[test]
fn test_unknown_format_is_unsupported() {
    let text = b"PTM_1.2\nPTM_FORMAT_LRGB_SPECULAR\n1\n1\n".to_vec();
    let err = Ptm::read_from(&mut Cursor::new(text), &RawPlaneCodec).unwrap_err();
    assert!(matches!(err, PtmError::UnsupportedFormat(ref n) if n == "PTM_FORMAT_LRGB_SPECULAR"));
}

#[test]
fn test_truncated_payload_is_io_error() {
    let mut header = Header::new(FormatId::Rgb.descriptor(), 4, 4);
    let blocks = random_blocks(&header, 9);
    let mut buf = Vec::new();
    write_ptm(&mut buf, &mut header, &blocks, &RawPlaneCodec).unwrap();
    buf.truncate(buf.len() - 10);

    let err = Ptm::read_from(&mut Cursor::new(buf), &RawPlaneCodec).unwrap_err();
    assert!(matches!(err, PtmError::Io(_)), "{err}");
}

#[test]
fn test_order_with_missing_step_is_malformed() {
    let mut header = Header::new(FormatId::JpegLrgb.descriptor(), 2, 2);
    header.streams.order = vec![0, 1, 2, 3, 4, 5, 6, 7, 7];
    let file = header.to_bytes().unwrap();

    let err = Ptm::read_from(&mut Cursor::new(file), &RawPlaneCodec).unwrap_err();
    assert!(matches!(err, PtmError::MalformedStream(_)), "{err}");
}

#[test]
fn test_oversized_dimensions_are_invalid_header() {
    let text = b"PTM_1.2\nPTM_FORMAT_RGB\n4294967296\n4294967297\n\
                 1.000000 1.000000 1.000000 1.000000 1.000000 1.000000\n0 0 0 0 0 0\n"
        .to_vec();
    let err = Ptm::read_from(&mut Cursor::new(text), &RawPlaneCodec).unwrap_err();
    assert!(matches!(err, PtmError::InvalidHeader(_)), "{err}");
}

#[test]
fn test_huge_declared_stream_length_is_eof_not_allocation() {
    let mut header = Header::new(FormatId::JpegRgb.descriptor(), 2, 2);
    header.streams.compressed_sizes[0] = 1 << 60;
    let mut file = header.to_bytes().unwrap();
    file.extend_from_slice(&pseudo_random_bytes(12, 4));

    let err = Ptm::read_from(&mut Cursor::new(file), &RawPlaneCodec).unwrap_err();
    match err {
        PtmError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
        other => panic!("expected an I/O error, got {other}"),
    }
}

// ── encoding ───────────────────────────────────────────────────────────────

#[test]
fn test_encode_rgb_reproduces_photographs() {
    let (w, h) = (6, 4);
    let photos = synthetic_photos(w, h, false);
    let options = EncodeOptions {
        format: FormatId::Rgb.descriptor(),
        ..EncodeOptions::default()
    };
    let (mut header, blocks) = encode(captures_of(w, h, &photos), &options).unwrap();
    assert_eq!((header.width, header.height), (w, h));

    let ptm = write_then_read(&mut header, &blocks, &RawPlaneCodec);
    for (light, pixels) in &photos {
        let relit = ptm.render(light.u, light.v);
        let diff = max_abs_diff(&relit.pixels, pixels);
        assert!(diff <= 3, "light ({}, {}) off by {}", light.u, light.v, diff);
    }
}

#[test]
fn test_encode_lrgb_gray_reproduces_photographs() {
    let (w, h) = (5, 5);
    let photos = synthetic_photos(w, h, true);
    let options = EncodeOptions {
        format: FormatId::Lrgb.descriptor(),
        ..EncodeOptions::default()
    };
    let (mut header, blocks) = encode(captures_of(w, h, &photos), &options).unwrap();

    let ptm = write_then_read(&mut header, &blocks, &RawPlaneCodec);
    for (light, pixels) in &photos {
        let relit = ptm.render(light.u, light.v);
        assert_eq!(relit.color_space, ColorSpace::Rgb);
        assert!(max_abs_diff(&relit.pixels, pixels) <= 4);
    }
}

#[test]
fn test_encode_lum_renders_luma_and_stored_chroma() {
    let (w, h) = (4, 3);
    let photos = synthetic_photos(w, h, true);
    let options = EncodeOptions {
        format: FormatId::Lum.descriptor(),
        ..EncodeOptions::default()
    };
    let (mut header, blocks) = encode(captures_of(w, h, &photos), &options).unwrap();

    let ptm = write_then_read(&mut header, &blocks, &RawPlaneCodec);
    let (light, pixels) = &photos[3];
    let relit = ptm.render(light.u, light.v);
    assert_eq!(relit.color_space, ColorSpace::YCbCr);
    for (out, src) in relit.pixels.chunks_exact(3).zip(pixels.chunks_exact(3)) {
        assert!(out[0].abs_diff(src[0]) <= 3);
        assert_eq!((out[1], out[2]), (128, 128), "gray input has neutral chroma");
    }
}

#[test]
fn test_encode_jpeg_rgb_file_is_close() {
    let (w, h) = (16, 16);
    let photos = synthetic_photos(w, h, false);
    let (mut header, blocks) = encode(captures_of(w, h, &photos), &EncodeOptions::default()).unwrap();
    assert_eq!(header.quality, 90);

    let path = temp_path("jpeg_rgb");
    write_ptm_file(&path, &mut header, &blocks, &JpegPlaneCodec).unwrap();
    let ptm = read_ptm(&path, &JpegPlaneCodec).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(ptm.header.format.id, FormatId::JpegRgb);
    assert_eq!(ptm.header.streams.len(), 18);
    // Random per-pixel coefficients are JPEG's worst case; only check that
    // the planes decode to the right shape and stay in the neighbourhood.
    let relit = ptm.render(0.0, 0.0);
    assert_eq!(relit.pixels.len(), w * h * 3);
    for b in 0..3 {
        let decoded = ptm.blocks.block(b);
        let mean_err: f64 = decoded
            .iter()
            .zip(blocks.block(b))
            .map(|(x, y)| x.abs_diff(*y) as f64)
            .sum::<f64>()
            / decoded.len() as f64;
        assert!(mean_err < 24.0, "block {} mean error {}", b, mean_err);
    }
}

#[test]
fn test_encode_quality_above_range_is_clamped() {
    let (w, h) = (4, 4);
    let photos = synthetic_photos(w, h, false);
    let options = EncodeOptions {
        quality: 200,
        ..EncodeOptions::default()
    };
    let (mut header, blocks) = encode(captures_of(w, h, &photos), &options).unwrap();
    assert_eq!(header.quality, 100);

    let mut buf = Vec::new();
    write_ptm(&mut buf, &mut header, &blocks, &RawPlaneCodec).unwrap();
    let ptm = Ptm::read_from(&mut Cursor::new(buf), &RawPlaneCodec).unwrap();
    assert_eq!(ptm.header.quality, 100);
}

#[test]
fn test_too_few_photographs() {
    let photos = synthetic_photos(2, 2, false);
    let captures = captures_of(2, 2, &photos[..5]);
    let err = encode(captures, &EncodeOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        PtmError::InsufficientSamples {
            found: 5,
            required: 12
        }
    ));
}

#[test]
fn test_photographs_must_share_dimensions() {
    let photos = synthetic_photos(3, 3, false);
    let mut captures = captures_of(3, 3, &photos);
    captures[7].photo = Photo::from_top_down(2, 3, ColorSpace::Rgb, vec![0; 18]).unwrap();

    let err = encode(captures, &EncodeOptions::default()).unwrap_err();
    assert!(matches!(err, PtmError::DimensionMismatch { index: 7, .. }), "{err}");
}
