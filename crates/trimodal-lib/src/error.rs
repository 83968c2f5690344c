//! Error taxonomy for dataset construction, feature caching and the media
//! collaborators.

use std::path::PathBuf;

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, DatasetError>;

/// Errors that can occur while building a dataset or materializing
/// per-utterance features.
///
/// Build-time structural errors (`MissingColumn`, `UnknownLabel`,
/// `MalformedRow`) are fatal and abort dataset construction; there are no
/// partial datasets. Lazy-load errors surface to the caller of the specific
/// accessor and leave sibling dialogues untouched.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("missing column `{column}` in tabular input header")]
    MissingColumn { column: String },

    #[error("unknown emotion label `{label}` (line {line})")]
    UnknownLabel { label: String, line: usize },

    #[error("malformed row at line {line}: {message}")]
    MalformedRow { line: usize, message: String },

    #[error("cache I/O failure at {}: {source}", .path.display())]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache entry at {} failed to encode/decode: {source}", .path.display())]
    CacheCodec {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A collaborator failure surfaced through the feature cache. The
    /// underlying decode/extract error is preserved unchanged as the source.
    #[error("feature computation failed for dia{dialogue_id}_utt{utterance_id}: {source}")]
    FeatureCompute {
        dialogue_id: i64,
        utterance_id: i64,
        #[source]
        source: Box<DatasetError>,
    },

    #[error("video decode failed for {}: {message}", .path.display())]
    VideoDecode { path: PathBuf, message: String },

    #[error("face feature extraction failed: {0}")]
    FeatureExtract(String),

    #[error("ffmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("ffprobe not found in PATH")]
    FfprobeNotFound,

    #[error("failed to read {}: {source}", .path.display())]
    TableIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    TableCodec {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl DatasetError {
    /// Create a `VideoDecode` error.
    pub fn video_decode(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::VideoDecode {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a `CacheIo` error.
    pub fn cache_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CacheIo {
            path: path.into(),
            source,
        }
    }
}
