use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ptm_codecs::{codec_for_format, encode_rendered_jpeg, load_captures};
use ptm_core::encode::input_color_space;
use ptm_core::format::{DEFAULT_QUALITY, MIN_LIGHTS};
use ptm_core::{
    encode, read_light_list, write_ptm, write_ptm_file, EncodeOptions, FormatDescriptor, Header,
    Ptm, PtmError, FORMATS,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "ptm",
    about = "Polynomial Texture Maps: build PTM 1.2 files from photographs, relight them, inspect them",
    version
)]
struct Cli {
    /// Log phase summaries to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a PTM to the photographs named in a light-position list
    Encode {
        /// Light list: one `filename u v [w]` line per photograph
        list: PathBuf,
        /// PTM format name (see `ptm formats`)
        #[arg(short, long, default_value = "PTM_FORMAT_JPEG_RGB")]
        format: String,
        /// Plane compression quality, 0–100 (compressed formats only)
        #[arg(short, long, default_value_t = DEFAULT_QUALITY as u8)]
        quality: u8,
        /// Destination PTM file ("-" writes to stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },
    /// Relight a PTM from one direction and write the result as JPEG
    Decode {
        /// Source PTM file ("-" reads stdin)
        input: PathBuf,
        /// Light direction u, in [-1, 1]
        #[arg(allow_negative_numbers = true)]
        u: f32,
        /// Light direction v, in [-1, 1]
        #[arg(allow_negative_numbers = true)]
        v: f32,
        /// Destination JPEG ("-" writes to stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
        /// Output JPEG quality; defaults to the quality recorded in the PTM
        #[arg(short, long)]
        quality: Option<u8>,
    },
    /// Relight a PTM once per light-list line, writing nameNNN.jpeg files
    Explode {
        /// Source PTM file
        input: PathBuf,
        /// Light list supplying the directions
        lights: PathBuf,
        /// Output name template; `out.jpg` yields out001.jpeg, out002.jpeg, ...
        output: PathBuf,
        /// Output JPEG quality; defaults to the quality recorded in the PTM
        #[arg(short, long)]
        quality: Option<u8>,
    },
    /// Print header metadata and the stream table
    Inspect {
        /// PTM file to inspect
        file: PathBuf,
        /// Print the parsed header as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the supported PTM formats
    Formats,
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn init_logging(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn is_stdio(path: &Path) -> bool {
    path.to_str() == Some("-")
}

fn open_input(input: &Path) -> anyhow::Result<Box<dyn BufRead>> {
    if is_stdio(input) {
        Ok(Box::new(io::stdin().lock()))
    } else {
        let file = File::open(input).with_context(|| format!("opening {:?}", input))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Read a whole PTM, decoding its streams with the codec its format calls for.
fn read_input(input: &Path) -> anyhow::Result<Ptm> {
    let mut reader = open_input(input)?;
    let header = Header::read_from(&mut reader)
        .with_context(|| format!("reading PTM header of {:?}", input))?;
    let codec = codec_for_format(header.format);
    Ptm::read_payload(header, &mut reader, codec.as_ref())
        .with_context(|| format!("reading PTM {:?}", input))
}

fn create_output(output: &Path) -> anyhow::Result<Box<dyn Write>> {
    if is_stdio(output) {
        Ok(Box::new(io::stdout().lock()))
    } else {
        let file = File::create(output)
            .with_context(|| format!("creating output file {:?}", output))?;
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// `dir/name.ext` → `dir/name{index:03}.jpeg`.
fn exploded_path(template: &Path, index: usize) -> PathBuf {
    let stem = template
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    template.with_file_name(format!("{stem}{index:03}.jpeg"))
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_encode(
    list: PathBuf,
    format_name: &str,
    quality: u8,
    output: PathBuf,
) -> anyhow::Result<()> {
    let format = FormatDescriptor::lookup(format_name)?;
    let codec = codec_for_format(format);
    let options = EncodeOptions { format, quality };

    let t0 = Instant::now();
    let entries = read_light_list(&list)
        .with_context(|| format!("reading light list {:?}", list))?;
    if entries.len() < MIN_LIGHTS {
        return Err(PtmError::InsufficientSamples {
            found: entries.len(),
            required: MIN_LIGHTS,
        })
        .with_context(|| format!("light list {:?}", list));
    }
    let captures = load_captures(&entries, input_color_space(format))
        .with_context(|| format!("loading photographs listed in {:?}", list))?;
    info!(photos = captures.len(), "loaded photographs");

    let (mut header, blocks) = encode(captures, &options)?;

    let written = if is_stdio(&output) {
        let mut out = io::stdout().lock();
        write_ptm(&mut out, &mut header, &blocks, codec.as_ref())?
    } else {
        write_ptm_file(&output, &mut header, &blocks, codec.as_ref())
            .with_context(|| format!("writing PTM {:?}", output))?
    };

    let elapsed = t0.elapsed();
    eprintln!("  format      : {}", format.name);
    eprintln!("  size        : {}x{}", header.width, header.height);
    eprintln!("  photographs : {}", entries.len());
    if format.is_compressed() {
        eprintln!("  plane codec : {} (quality {})", codec.name(), header.quality);
    }
    eprintln!("  written     : {}", human_bytes(written));
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_decode(
    input: PathBuf,
    u: f32,
    v: f32,
    output: PathBuf,
    quality: Option<u8>,
) -> anyhow::Result<()> {
    let ptm = read_input(&input)?;
    let quality = quality.unwrap_or_else(|| ptm.header.output_quality());

    let t0 = Instant::now();
    let image = ptm.render(u, v);
    info!(
        u,
        v,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "rendered"
    );

    let mut out = create_output(&output)?;
    encode_rendered_jpeg(&image, quality, &mut out)
        .with_context(|| format!("writing JPEG {:?}", output))?;
    out.flush()?;
    Ok(())
}

fn run_explode(
    input: PathBuf,
    lights: PathBuf,
    output: PathBuf,
    quality: Option<u8>,
) -> anyhow::Result<()> {
    let ptm = read_input(&input)?;
    let quality = quality.unwrap_or_else(|| ptm.header.output_quality());
    let entries = read_light_list(&lights)
        .with_context(|| format!("reading light list {:?}", lights))?;

    let t0 = Instant::now();
    for (i, entry) in entries.iter().enumerate() {
        let path = exploded_path(&output, i + 1);
        let image = ptm.render(entry.light.u, entry.light.v);
        let mut out = create_output(&path)?;
        encode_rendered_jpeg(&image, quality, &mut out)
            .with_context(|| format!("writing JPEG {:?}", path))?;
        out.flush()?;
    }
    eprintln!("  images      : {}", entries.len());
    eprintln!("  elapsed     : {:.3}s", t0.elapsed().as_secs_f64());
    Ok(())
}

fn run_inspect(file: PathBuf, json: bool) -> anyhow::Result<()> {
    let mut input = open_input(&file)?;
    let header = Header::read_from(&mut input)
        .with_context(|| format!("reading PTM header of {:?}", file))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&header)?);
        return Ok(());
    }

    let format = header.format;
    println!("=== PTM File: {:?} ===", file);
    println!();
    println!("  format         : {}", format.name);
    println!("  dimensions     : {}x{}", header.width, header.height);
    println!("  blocks         : {}", format.total_blocks);
    println!("  scale          : {:?}", header.scale);
    println!("  bias           : {:?}", header.bias);
    if !is_stdio(&file) {
        let file_size = std::fs::metadata(&file)?.len();
        println!("  file on disk   : {}", human_bytes(file_size));
    }

    if format.is_compressed() {
        let s = &header.streams;
        println!("  quality        : {}", header.quality);
        println!("  streams        : {}", s.len());
        println!(
            "  compressed     : {}",
            human_bytes(s.compressed_sizes.iter().sum())
        );
        println!();
        println!(
            "  {:>6}  {:>9}  {:>8}  {:>8}  {:>5}  {:>9}  {:>12}  {:>9}",
            "stream", "transform", "motion_x", "motion_y", "order", "reference", "compressed", "side info"
        );
        println!("  {}", "-".repeat(82));
        for i in 0..s.len() {
            println!(
                "  {:>6}  {:>9}  {:>8}  {:>8}  {:>5}  {:>9}  {:>12}  {:>9}",
                i,
                s.transforms[i],
                s.motion_x[i],
                s.motion_y[i],
                s.order[i],
                s.reference_planes[i],
                human_bytes(s.compressed_sizes[i]),
                s.side_info_sizes[i]
            );
        }
    }
    Ok(())
}

fn run_formats() {
    for f in FORMATS.iter() {
        let kind = if f.is_compressed() {
            format!("{} compressed streams", f.stream_count)
        } else {
            "uncompressed".to_string()
        };
        println!("{:<22} {} blocks, {}", f.name, f.total_blocks, kind);
    }
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Commands::Encode {
            list,
            format,
            quality,
            output,
        } => run_encode(list, &format, quality, output),
        Commands::Decode {
            input,
            u,
            v,
            output,
            quality,
        } => run_decode(input, u, v, output, quality),
        Commands::Explode {
            input,
            lights,
            output,
            quality,
        } => run_explode(input, lights, output, quality),
        Commands::Inspect { file, json } => run_inspect(file, json),
        Commands::Formats => {
            run_formats();
            Ok(())
        }
    }
}
