//! Transport layer
//!
//! Abstracts the remote-shell channel for testability:
//! - Transport trait: run one command, batch file pushes and pulls
//! - LocalTransport: the "remote" is the local filesystem
//! - SshTransport: `ssh` for commands, `scp` for files

use serde::Serialize;
use std::io;
use std::path::PathBuf;

use crate::files::TrackedFile;

/// How a command is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecMode {
    /// Return as soon as the command is spawned; output is not captured
    pub asynchronous: bool,
    /// Turn a nonzero exit status into [`TransportError::CommandFailed`]
    pub raise_errors: bool,
}

impl ExecMode {
    /// Wait for completion and fail on a nonzero exit status
    pub const STRICT: ExecMode = ExecMode {
        asynchronous: false,
        raise_errors: true,
    };

    /// Wait for completion and hand back whatever happened
    pub const LENIENT: ExecMode = ExecMode {
        asynchronous: false,
        raise_errors: false,
    };
}

/// Captured result of one command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit status; None when the command was not waited for or was killed
    pub status: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// What one `transfer` moved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    pub pushed: usize,
    pub pulled: usize,
}

/// Transport trait for the remote-shell channel
pub trait Transport: Send {
    /// Execute one shell command on the remote host
    fn exec(&self, command: &str, mode: ExecMode) -> Result<CommandOutput, TransportError>;

    /// Queue a local file to be pushed to its remote path
    fn queue_for_push(&mut self, file: &TrackedFile);

    /// Queue a remote file to be pulled to its local path
    fn queue_for_pull(&mut self, file: &TrackedFile);

    /// Perform every queued push, then every queued pull. Both queues are
    /// drained even when this fails.
    fn transfer(&mut self) -> Result<TransferReport, TransportError>;
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("command `{command}` exited with {status:?}: {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("missing file: {0}")]
    MissingFile(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("SSH error: {0}")]
    Ssh(String),
}

/// Deduplicating queue of files, in insertion order
#[derive(Debug, Default)]
pub(crate) struct FileQueue {
    files: Vec<TrackedFile>,
}

impl FileQueue {
    pub fn push(&mut self, file: &TrackedFile) {
        if !self.files.contains(file) {
            self.files.push(file.clone());
        }
    }

    pub fn take(&mut self) -> Vec<TrackedFile> {
        std::mem::take(&mut self.files)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

pub(crate) fn output_from(output: std::process::Output) -> CommandOutput {
    CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        status: output.status.code(),
    }
}

/// Apply `raise_errors` to a finished command
pub(crate) fn check_status(
    command: &str,
    output: CommandOutput,
    mode: ExecMode,
) -> Result<CommandOutput, TransportError> {
    if mode.raise_errors && !output.success() {
        return Err(TransportError::CommandFailed {
            command: command.to_string(),
            status: output.status,
            stderr: output.stderr,
        });
    }
    Ok(output)
}
