//! Shared helpers for integration tests
//!
//! - `Workspace`: scratch local and "remote" directories for `LocalTransport`
//! - `CannedTransport`: a transport that answers from scripted output

#![allow(dead_code)]

use remora::host::{CommandOutput, ExecMode, TransferReport, Transport, TransportError};
use remora::{Dirs, Host, Process, ShellFunction, TrackedFile, WaitConfig};
use serde_json::{Map, Value};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tempfile::TempDir;

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .init();
        }
    });
}

/// Scratch directories; the remote side is a local directory
pub struct Workspace {
    tmp: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        init_tracing();
        Self {
            tmp: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.tmp.path().to_path_buf()
    }

    pub fn dirs(&self) -> Dirs {
        Dirs::new(
            self.tmp.path().join("local"),
            self.tmp.path().join("remote").to_string_lossy().to_string(),
        )
    }

    /// Path of a file in the remote directory
    pub fn remote(&self, name: &str) -> PathBuf {
        self.tmp.path().join("remote").join(name)
    }

    /// Path of a file in the local staging directory
    pub fn local(&self, name: &str) -> PathBuf {
        self.tmp.path().join("local").join(name)
    }

    pub fn process(&self, function: ShellFunction) -> Process {
        self.process_on(function, Host::local())
    }

    pub fn process_on(&self, function: ShellFunction, host: Host) -> Process {
        Process::new(function, host, self.dirs()).with_wait(quick_wait(30))
    }

    /// Local host whose remote scripts see a `date` that moves one second
    /// forward on every call
    pub fn stepping_clock_host(&self) -> Host {
        let bin = self.tmp.path().join("clock");
        fs::create_dir_all(&bin).expect("create clock dir");
        let date = bin.join("date");
        fs::write(&date, STEPPING_DATE).expect("write date shim");
        fs::set_permissions(&date, fs::Permissions::from_mode(0o755)).expect("make date executable");
        Host::local().with_shell(format!("PATH={}:\"$PATH\" bash", bin.display()))
    }
}

const STEPPING_DATE: &str = r#"#!/usr/bin/env bash
count="$(dirname "$0")/count"
n=$(( $(cat "$count" 2>/dev/null || echo 0) + 1 ))
echo "$n" > "$count"
printf '2030-01-01 %02d:%02d:%02d\n' $(( n / 3600 )) $(( n / 60 % 60 )) $(( n % 60 ))
"#;

/// Poll every 100ms for up to `timeout_secs`
pub fn quick_wait(timeout_secs: u64) -> WaitConfig {
    WaitConfig::new(Duration::from_millis(100), Duration::from_secs(timeout_secs))
}

/// `add a b` prints the sum
pub fn add() -> ShellFunction {
    ShellFunction::new("add", ["a", "b"], "echo $((a + b))").expect("valid function")
}

/// `nap x` sleeps `seconds`, then prints `done-<x>`
pub fn nap(seconds: f64) -> ShellFunction {
    ShellFunction::new("nap", ["x"], format!("sleep {}\necho \"done-$x\"", seconds))
        .expect("valid function")
}

/// Turn a `json!` object into prepare arguments
pub fn args(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

/// Scripted answers for [`CannedTransport`]
#[derive(Clone, Default)]
pub struct Canned {
    /// Answer to the submission command
    pub submit: Arc<Mutex<CommandOutput>>,
    /// Manifest text served to `cat`
    pub manifest: Arc<Mutex<String>>,
    /// Every command issued, in order
    pub commands: Arc<Mutex<Vec<String>>>,
}

impl Canned {
    pub fn set_submit(&self, stdout: &str, stderr: &str) {
        *self.submit.lock().unwrap() = CommandOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            status: Some(0),
        };
    }

    pub fn set_manifest(&self, text: &str) {
        *self.manifest.lock().unwrap() = text.to_string();
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

/// Transport that runs nothing: files stay where they are and commands are
/// answered from a [`Canned`].
pub struct CannedTransport {
    canned: Canned,
}

impl CannedTransport {
    pub fn new(canned: Canned) -> Self {
        Self { canned }
    }
}

impl Transport for CannedTransport {
    fn exec(&self, command: &str, _mode: ExecMode) -> Result<CommandOutput, TransportError> {
        self.canned.commands.lock().unwrap().push(command.to_string());
        if command.starts_with("cat ") {
            return Ok(CommandOutput {
                stdout: self.canned.manifest.lock().unwrap().clone(),
                stderr: String::new(),
                status: Some(0),
            });
        }
        Ok(self.canned.submit.lock().unwrap().clone())
    }

    fn queue_for_push(&mut self, _file: &TrackedFile) {}

    fn queue_for_pull(&mut self, _file: &TrackedFile) {}

    fn transfer(&mut self) -> Result<TransferReport, TransportError> {
        Ok(TransferReport::default())
    }
}
