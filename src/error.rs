//! Error types for flatjoin.

use std::fmt;
use std::io;
use thiserror::Error;

/// The result type used throughout flatjoin.
pub type Result<T> = std::result::Result<T, Error>;

/// Which end of the payload an anchor marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorKind {
    /// Marks the first byte after the header.
    Start,
    /// Marks the first byte of the footer.
    End,
}

impl fmt::Display for AnchorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnchorKind::Start => write!(f, "start"),
            AnchorKind::End => write!(f, "end"),
        }
    }
}

/// The error type for flatjoin operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A configured anchor was never found before end of stream.
    #[error(
        "Boundary not found: {anchor} anchor {preview:?} not located after offset {searched_from}"
    )]
    BoundaryNotFound {
        /// Which anchor was missing.
        anchor: AnchorKind,
        /// Lossy text of the anchor, for diagnostics.
        preview: String,
        /// Offset the search began at.
        searched_from: u64,
    },

    /// A single record could not be decoded. Absorbed by the pipeline.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// An I/O error on a source, run or output file.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The dataset definition or options are unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A composite record could not be serialized for the sink.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The persistence collaborator rejected a batch.
    #[error("Sink error: {0}")]
    Sink(String),
}

impl Error {
    /// Creates a new invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Error::InvalidConfiguration(msg.into())
    }

    /// Creates a new malformed record error with a short preview of the bytes.
    pub fn malformed(raw: &[u8]) -> Self {
        const PREVIEW: usize = 64;
        let end = raw.len().min(PREVIEW);
        Error::MalformedRecord(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    /// Creates a new sink error.
    pub fn sink(msg: impl Into<String>) -> Self {
        Error::Sink(msg.into())
    }

    /// Returns false only for errors the pipeline absorbs at record scope.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::MalformedRecord(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
