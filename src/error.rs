//! Error types for cache operations
//!
//! This module defines the custom error type for the tiercache library.
//! Expected absences (missing key, version mismatch, expired blob) are not
//! errors and are surfaced as `None`/defaults by the read paths; the variants
//! here cover I/O failures, undecodable on-disk data and API misuse.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// I/O failure while reading or writing a cache file
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The on-disk envelope carries a format version this build does not understand
    #[error("unsupported cache envelope format version {found}")]
    UnsupportedFormat { found: u64 },

    /// The on-disk envelope could not be decoded at all
    #[error("malformed cache envelope: {0}")]
    MalformedEnvelope(String),

    /// A value could not be encoded into the envelope substrate
    #[error("encoding error: {0}")]
    Encode(String),

    /// Keyed lookup that is contracted to find an entry came up empty
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Arithmetic operation on a key whose stored value is not an integer
    #[error("expected an integer under key '{key}', found {kind}")]
    NotAnInteger { key: String, kind: &'static str },

    /// Lifecycle contract violation (double load, unload without load)
    #[error("cache lifecycle misuse: {0}")]
    Lifecycle(String),

    /// A background worker running a blocking file operation panicked or was cancelled
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}
