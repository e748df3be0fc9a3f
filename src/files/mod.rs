//! Tracked artifacts
//!
//! Every generated or user-supplied file is a [`TrackedFile`]. Owners keep
//! them in fixed named fields plus explicit lists of extra files.

mod tracked;

pub use tracked::TrackedFile;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use tracked::join_remote;

/// Local staging directory and remote working directory of one Process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dirs {
    pub local: PathBuf,
    pub remote: String,
}

impl Dirs {
    pub fn new(local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
        }
    }

    /// A file of this name in both directories
    pub fn file(&self, name: &str) -> TrackedFile {
        TrackedFile::in_dirs(name, &self.local, &self.remote)
    }

    /// A user file to push: read from `path`, lands in the remote directory
    /// under its file name.
    pub fn extra_send(&self, path: &Path) -> TrackedFile {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        let remote = join_remote(&self.remote, &name);
        TrackedFile::new(name, path, remote)
    }

    /// A remote file to pull back into the local directory
    pub fn extra_recv(&self, name: &str) -> TrackedFile {
        self.file(name)
    }
}

/// Artifacts owned by one Runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerFiles {
    pub jobscript: TrackedFile,
    pub result: TrackedFile,
    pub extra_send: Vec<TrackedFile>,
    pub extra_recv: Vec<TrackedFile>,
}

impl RunnerFiles {
    pub fn for_runner(runner_name: &str, dirs: &Dirs) -> Self {
        Self {
            jobscript: dirs.file(&format!("{}-jobscript.sh", runner_name)),
            result: dirs.file(&format!("{}-result.json", runner_name)),
            extra_send: Vec::new(),
            extra_recv: Vec::new(),
        }
    }

    pub fn files_to_send(&self) -> impl Iterator<Item = &TrackedFile> {
        std::iter::once(&self.jobscript).chain(self.extra_send.iter())
    }

    pub fn files_to_recv(&self) -> impl Iterator<Item = &TrackedFile> {
        std::iter::once(&self.result).chain(self.extra_recv.iter())
    }

    /// Files the remote bootstrap must verify before running this Runner
    pub fn integrity_checked(&self) -> impl Iterator<Item = &TrackedFile> {
        self.files_to_send()
    }
}

/// Artifacts shared by every Runner of one Process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessFiles {
    pub master: TrackedFile,
    pub bootstrap: TrackedFile,
    pub manifest: TrackedFile,
    pub extra_send: Vec<TrackedFile>,
    pub extra_recv: Vec<TrackedFile>,
}

impl ProcessFiles {
    pub fn for_process(process_name: &str, dirs: &Dirs) -> Self {
        Self {
            master: dirs.file(&format!("{}-master.sh", process_name)),
            bootstrap: dirs.file(&format!("{}-bootstrap.sh", process_name)),
            manifest: dirs.file(&format!("{}-manifest.txt", process_name)),
            extra_send: Vec::new(),
            extra_recv: Vec::new(),
        }
    }

    /// Shared files pushed on every transfer. The manifest only ever flows
    /// remote to local.
    pub fn files_to_send(&self) -> impl Iterator<Item = &TrackedFile> {
        [&self.master, &self.bootstrap]
            .into_iter()
            .chain(self.extra_send.iter())
    }

    pub fn files_to_recv(&self) -> impl Iterator<Item = &TrackedFile> {
        self.extra_recv.iter()
    }
}
