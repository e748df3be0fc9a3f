//! Local/remote path pairs

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One logical artifact that exists locally, remotely, or both.
///
/// A TrackedFile is only a pair of paths; neither its owner nor the
/// Transport that moves it deletes anything implicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedFile {
    /// Logical name; also the file name relative to the remote directory
    name: String,
    local: PathBuf,
    remote: String,
}

impl TrackedFile {
    pub fn new(name: impl Into<String>, local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            local: local.into(),
            remote: remote.into(),
        }
    }

    /// A file called `name` in both `local_dir` and `remote_dir`
    pub fn in_dirs(name: impl Into<String>, local_dir: &Path, remote_dir: &str) -> Self {
        let name = name.into();
        let local = local_dir.join(&name);
        let remote = join_remote(remote_dir, &name);
        Self { name, local, remote }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_path(&self) -> &Path {
        &self.local
    }

    /// POSIX path on the remote host
    pub fn remote_path(&self) -> &str {
        &self.remote
    }

    /// Directory part of the remote path
    pub fn remote_dir(&self) -> &str {
        match self.remote.rfind('/') {
            Some(0) => "/",
            Some(idx) => &self.remote[..idx],
            None => ".",
        }
    }

    pub fn exists_local(&self) -> bool {
        self.local.is_file()
    }

    pub fn read(&self) -> io::Result<String> {
        fs::read_to_string(&self.local)
    }

    /// Replace the local content (write-then-rename)
    pub fn write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.local.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut temp_name = self.local.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, &self.local)?;
        Ok(())
    }

    /// SHA-256 hex digest of the local content
    pub fn sha256(&self) -> io::Result<String> {
        let bytes = fs::read(&self.local)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

pub(crate) fn join_remote(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}
