use std::io;

/// Errors produced while reading, writing, fitting, or rendering PTM files.
///
/// Every variant is fatal for the operation that raised it. Lenient cases
/// (out-of-range side-info offsets, malformed light-list lines, constant
/// coefficient channels) are handled in place and never surface here.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PtmError {
    #[error("not a PTM file (missing PTM_1.2 magic line)")]
    NotAPtmFile,

    #[error("unsupported PTM format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid PTM header: {0}")]
    InvalidHeader(String),

    #[error("malformed stream data: {0}")]
    MalformedStream(String),

    #[error("input image {index} is {actual_width}x{actual_height}, expected {width}x{height}")]
    DimensionMismatch {
        index: usize,
        width: usize,
        height: usize,
        actual_width: usize,
        actual_height: usize,
    },

    #[error("not enough light samples: found {found}, need at least {required}")]
    InsufficientSamples { found: usize, required: usize },

    #[error("singular value decomposition did not converge")]
    SvdDidNotConverge,

    #[error("image codec error: {0}")]
    Codec(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, PtmError>;
