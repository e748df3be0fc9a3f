//! Local transport: remote paths are paths on this machine

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

use super::transport::{
    check_status, output_from, CommandOutput, ExecMode, FileQueue, TransferReport, Transport,
    TransportError,
};
use crate::files::TrackedFile;

/// Runs commands through `bash -c` and moves files with plain copies.
///
/// Used for tests and for hosts whose working directory is mounted locally.
#[derive(Debug, Default)]
pub struct LocalTransport {
    push: FileQueue,
    pull: FileQueue,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Copy into a temp file next to `to`, then rename over it, so that a
/// script still being read by a running shell keeps its old inode.
fn copy_replace(from: &Path, to: &Path) -> Result<(), TransportError> {
    if !from.is_file() {
        return Err(TransportError::MissingFile(from.to_path_buf()));
    }
    if let Some(parent) = to.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut temp = to.as_os_str().to_owned();
    temp.push(".transfer");
    fs::copy(from, &temp)?;
    fs::rename(&temp, to)?;
    Ok(())
}

impl Transport for LocalTransport {
    fn exec(&self, command: &str, mode: ExecMode) -> Result<CommandOutput, TransportError> {
        debug!(command, asynchronous = mode.asynchronous, "local exec");

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(command).stdin(Stdio::null());

        if mode.asynchronous {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
            cmd.spawn().map_err(|source| TransportError::Spawn {
                program: "bash".to_string(),
                source,
            })?;
            return Ok(CommandOutput::default());
        }

        let output = cmd.output().map_err(|source| TransportError::Spawn {
            program: "bash".to_string(),
            source,
        })?;
        check_status(command, output_from(output), mode)
    }

    fn queue_for_push(&mut self, file: &TrackedFile) {
        self.push.push(file);
    }

    fn queue_for_pull(&mut self, file: &TrackedFile) {
        self.pull.push(file);
    }

    fn transfer(&mut self) -> Result<TransferReport, TransportError> {
        let push = self.push.take();
        let pull = self.pull.take();
        let mut report = TransferReport::default();

        for file in &push {
            copy_replace(file.local_path(), Path::new(file.remote_path()))?;
            report.pushed += 1;
        }
        for file in &pull {
            copy_replace(Path::new(file.remote_path()), file.local_path())?;
            report.pulled += 1;
        }

        debug!(pushed = report.pushed, pulled = report.pulled, "local transfer");
        Ok(report)
    }
}
