//! Host binding
//!
//! A [`Host`] pairs a [`Transport`] with the three binaries the generated
//! scripts rely on remotely.

mod local;
mod ssh;
mod transport;

pub use local::LocalTransport;
pub use ssh::{SshConfig, SshTransport};
pub use transport::{CommandOutput, ExecMode, TransferReport, Transport, TransportError};

use std::fmt;

use crate::config::{HostKind, Settings};

/// Where and how a Process executes
pub struct Host {
    transport: Box<dyn Transport>,
    /// Executes the master script
    pub shell: String,
    /// Launches each Runner's jobscript
    pub submitter: String,
    /// Executes the remote bootstrap (must be bash-compatible)
    pub interpreter: String,
    /// Extra regexes for submission stderr that is not an error
    pub ignore_stderr: Vec<String>,
}

impl Host {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            shell: "bash".to_string(),
            submitter: "bash".to_string(),
            interpreter: "bash".to_string(),
            ignore_stderr: Vec::new(),
        }
    }

    /// A host whose remote directory lives on this machine
    pub fn local() -> Self {
        Self::new(LocalTransport::new())
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let mut host = match settings.host.kind {
            HostKind::Local => Self::local(),
            HostKind::Ssh => Self::new(SshTransport::new(SshConfig::from_settings(&settings.host))),
        };
        host.shell = settings.host.shell.clone();
        host.submitter = settings.host.submitter.clone();
        host.interpreter = settings.host.interpreter.clone();
        host.ignore_stderr = settings.ignore_stderr.clone();
        host
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_submitter(mut self, submitter: impl Into<String>) -> Self {
        self.submitter = submitter.into();
        self
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn with_ignore_stderr(mut self, patterns: Vec<String>) -> Self {
        self.ignore_stderr = patterns;
        self
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("shell", &self.shell)
            .field("submitter", &self.submitter)
            .field("interpreter", &self.interpreter)
            .field("ignore_stderr", &self.ignore_stderr)
            .finish_non_exhaustive()
    }
}
