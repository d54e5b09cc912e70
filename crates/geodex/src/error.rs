//! Error and Result types for geodex operations.

use std::io;
use thiserror::Error;

/// A convenience `Result` type for geodex operations.
pub type Result<T> = std::result::Result<T, GeodexError>;

/// The error type for geodex operations.
///
/// Open-time failures (`Io`, `InvalidLayout`, `InvalidMagic`) leave a store
/// unopened. Unit-level failures (`Decode`, `InvalidUtf8`) affect one row or
/// feature and are normally skipped by the caller. `UnsupportedGeometry`
/// fails a single feature lookup. `Build` and `Store` abort a name index
/// build. `InvalidInput` rejects data handed to a file writer.
#[derive(Debug, Error)]
pub enum GeodexError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Segment arithmetic does not fit the file.
    #[error("Invalid layout: {section} needs bytes {start}..{end}, file is {file_len} bytes")]
    InvalidLayout {
        /// Name of the section that did not fit.
        section: &'static str,
        /// Start offset of the section.
        start: u64,
        /// End offset of the section (exclusive).
        end: u64,
        /// Total file length.
        file_len: u64,
    },

    /// Invalid magic bytes at the start of a file.
    #[error("Invalid magic bytes: {0:?}")]
    InvalidMagic([u8; 8]),

    /// A single row or feature could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Bytes that should hold text are not valid UTF-8.
    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// Geometry type outside Polygon and MultiPolygon.
    #[error("Unsupported geometry type: {0}")]
    UnsupportedGeometry(u8),

    /// The name index build failed; the built flag was not set.
    #[error("Name index build failed: {0}")]
    Build(String),

    /// The search or settings store reported a failure.
    #[error("Store error: {0}")]
    Store(String),

    /// A writer was given data its file format cannot represent.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl GeodexError {
    /// Returns true if the error is local to one row or feature.
    pub fn is_unit_local(&self) -> bool {
        matches!(
            self,
            GeodexError::Decode(_) | GeodexError::InvalidUtf8(_) | GeodexError::UnsupportedGeometry(_)
        )
    }
}

impl From<flatbuffers::InvalidFlatbuffer> for GeodexError {
    fn from(err: flatbuffers::InvalidFlatbuffer) -> Self {
        GeodexError::Decode(format!("invalid flatbuffer: {}", err))
    }
}

impl From<serde_json::Error> for GeodexError {
    fn from(err: serde_json::Error) -> Self {
        GeodexError::Store(format!("settings serialization: {}", err))
    }
}
