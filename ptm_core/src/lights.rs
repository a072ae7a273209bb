use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;

/// A light direction projected onto the unit disk.
///
/// `u² + v² ≤ 1` is the caller's responsibility; `w` is carried but unused.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LightSample {
    pub u: f32,
    pub v: f32,
    pub w: f32,
}

impl LightSample {
    pub fn new(u: f32, v: f32) -> Self {
        Self { u, v, w: 0.0 }
    }
}

/// One usable line of a light-position list: `filename u v [w]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LightEntry {
    /// Image path, already resolved against the list file's directory.
    pub path: PathBuf,
    pub light: LightSample,
}

/// Parse light-list text. Lines that do not carry at least a filename and two
/// numbers are skipped with a warning, so a leading image-count line is
/// silently tolerated.
pub fn parse_light_list(text: &str, base_dir: &Path) -> Vec<LightEntry> {
    text.lines()
        .enumerate()
        .filter_map(|(lineno, line)| {
            let entry = parse_line(line, base_dir);
            if entry.is_none() && !line.trim().is_empty() {
                warn!(line = lineno + 1, text = line, "skipping malformed light-list line");
            }
            entry
        })
        .collect()
}

fn parse_line(line: &str, base_dir: &Path) -> Option<LightEntry> {
    let mut fields = line.split_whitespace();
    let name = fields.next()?;
    let u: f32 = fields.next()?.parse().ok()?;
    let v: f32 = fields.next()?.parse().ok()?;
    let w: f32 = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0.0);
    Some(LightEntry {
        path: base_dir.join(name),
        light: LightSample { u, v, w },
    })
}

/// Read and parse a light-list file; image names resolve relative to its directory.
pub fn read_light_list(path: impl AsRef<Path>) -> Result<Vec<LightEntry>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
    Ok(parse_light_list(&text, base_dir))
}
