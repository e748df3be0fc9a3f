//! Error types for the manifest protocol.

use std::io;

/// Errors raised while encoding, decoding or appending manifest events.
///
/// The reconstruction parser itself is lenient and never fails; these errors
/// come from strict single-event parsing and file appends.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("malformed manifest line: {0}")]
    MalformedLine(String),

    #[error("unknown state tag '{0}'")]
    UnknownState(String),

    #[error("producer id must be {expected} characters, got '{actual}'")]
    InvalidProducer { expected: usize, actual: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
