//! Centralized error types for ryusync.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the ryusync library.
#[derive(Error, Debug)]
pub enum ToolError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The save archive header or entry bounds are inconsistent.
    #[error("Corrupt save archive '{path}': {reason}")]
    CorruptArchive { path: PathBuf, reason: String },

    /// A file or directory that must already exist is absent.
    #[error("Required file not found: {0}")]
    MissingPrerequisite(PathBuf),

    /// The metadata extractor failed or produced unusable output.
    #[error("Could not extract title metadata from '{path}': {reason}")]
    Extraction { path: PathBuf, reason: String },

    /// The metadata extractor did not finish in time.
    #[error("Metadata extractor timed out after {secs}s on '{path}'")]
    ExtractorTimeout { path: PathBuf, secs: u64 },

    /// Backing up or merging a save tree failed.
    #[error("Save copy failed for title {title} at '{path}': {source}")]
    SyncCopy {
        title: String,
        path: PathBuf,
        source: std::io::Error,
    },

    /// A string is not a 16-digit hexadecimal title id.
    #[error("Invalid title id: {0}")]
    InvalidTitleId(String),

    /// Writing a report or registry file failed.
    #[error("Export error: {0}")]
    Export(String),
}

/// Convenience alias for `Result<T, ToolError>`.
pub type Result<T> = std::result::Result<T, ToolError>;

impl ToolError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `CorruptArchive` variant.
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptArchive {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Map an `io::Error` on `path`, turning `NotFound` into `MissingPrerequisite`.
    pub fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::MissingPrerequisite(path)
        } else {
            Self::Io { path, source }
        }
    }
}

/// Allow `?` on `std::io::Error` inside functions returning `ToolError`
/// when no path context is available (rare, prefer `ToolError::io`).
impl From<std::io::Error> for ToolError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
