//! Remora - remote function execution over a plain remote-shell channel
//!
//! A [`Process`] ships a shell function to a host reachable only through
//! `ssh`-style command execution and file copies, runs it once per argument
//! binding ([`Runner`]), and learns what happened by pulling and parsing an
//! append-only manifest the remote side writes to. No remote agent runs
//! between invocations.

pub mod config;
pub mod error;
pub mod files;
pub mod host;
pub mod payload;
pub mod process;
pub mod runner;
pub mod shell;
pub mod state;
pub mod stderr;
pub mod timeout;

pub use config::{EffectiveSettings, ExecOptions, ExecOverrides, Settings};
pub use error::{ProcessError, RunnerFailedError, SubmissionError};
pub use files::{Dirs, TrackedFile};
pub use host::{Host, LocalTransport, SshTransport, Transport};
pub use payload::{CallArguments, Payload, ShellFunction};
pub use process::Process;
pub use runner::{Runner, RunnerResult};
pub use state::RunnerState;
pub use timeout::WaitConfig;
