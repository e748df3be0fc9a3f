//! Error types
//!
//! Two failure scopes: [`SubmissionError`] aborts a whole Process, while
//! [`RunnerFailedError`] is stored as one Runner's result so its siblings
//! are still collected.

use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;

use crate::config::ConfigError;
use crate::host::TransportError;
use crate::payload::PayloadError;
use remora_manifest::ManifestError;

/// The remote command could not be issued, or the master script did not
/// report back as expected. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("submission failed: {message}")]
pub struct SubmissionError {
    pub message: String,
}

impl SubmissionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A Runner failed remotely: its function exited nonzero, an artifact
/// failed its integrity check, or a binary was missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("runner {runner} failed: {message}")]
pub struct RunnerFailedError {
    /// Runner name
    pub runner: String,
    /// Captured stderr of the failed execution
    pub message: String,
}

/// Process-level errors
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("timed out after {waited:?} with {pending} runner(s) unfinished")]
    Timeout { waited: Duration, pending: usize },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown argument(s): {0}")]
    UnknownArgument(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("payload error: {0}")]
    Payload(#[from] PayloadError),
}

impl ProcessError {
    /// Exit code used by the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            ProcessError::Config(_) => 1,
            ProcessError::InvalidArgument(_) | ProcessError::UnknownArgument(_) => 2,
            ProcessError::Payload(_) => 3,
            ProcessError::Transport(_) => 20,
            ProcessError::Submission(_) => 30,
            ProcessError::Timeout { .. } => 40,
            ProcessError::Manifest(_) => 50,
            ProcessError::Io(_) | ProcessError::Serialization(_) => 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_failed_error_serializes() {
        let err = RunnerFailedError {
            runner: "Process-f-runner-0".to_string(),
            message: "boom".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["runner"], "Process-f-runner-0");
        assert_eq!(err.to_string(), "runner Process-f-runner-0 failed: boom");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ProcessError::from(SubmissionError::new("x")).exit_code(), 30);
        assert_eq!(
            ProcessError::Timeout {
                waited: Duration::from_secs(1),
                pending: 2
            }
            .exit_code(),
            40
        );
        assert_eq!(ProcessError::UnknownArgument("z".into()).exit_code(), 2);
    }

    #[test]
    fn test_submission_error_is_transparent() {
        let err = ProcessError::from(SubmissionError::new("no echo"));
        assert_eq!(err.to_string(), "submission failed: no echo");
    }
}
