//! Payloads: the callable shipped to the remote host
//!
//! A payload is already portable text. Nothing is reflected or
//! reconstructed at runtime; the bootstrap embeds [`Payload::source`]
//! verbatim and calls the function by name.

mod args;
mod shell_function;

pub use args::{shell_argument, CallArguments};
pub use shell_function::ShellFunction;

use sha2::{Digest, Sha256};
use std::fmt;
use std::io;

/// Names that `prepare` consumes itself and so cannot be parameters
pub const RESERVED_NAMES: [&str; 5] = [
    "asynchronous",
    "force",
    "skip",
    "extra_files_send",
    "extra_files_recv",
];

/// A callable with a reproducible source body
pub trait Payload: fmt::Debug + Send + Sync {
    /// Function name, as called by the bootstrap
    fn name(&self) -> &str;

    /// Canonical source text defining the function
    fn source(&self) -> String;

    /// Declared parameter names, in call order
    fn declared_params(&self) -> &[String];

    /// Job identity: SHA-256 hex of the source
    fn identity(&self) -> String {
        hex::encode(Sha256::digest(self.source().as_bytes()))
    }
}

/// Payload errors
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("invalid function name {0:?}")]
    InvalidName(String),

    #[error("invalid parameter name {0:?}")]
    InvalidParam(String),

    #[error("duplicate parameter {0:?}")]
    DuplicateParam(String),

    #[error("parameter name {0:?} is reserved")]
    ReservedParam(String),

    #[error("canonicalization failed: {0}")]
    Canonicalization(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
