//! Process: one job definition, its host binding and its Runners
//!
//! ```text
//! prepare() -> stage() -> transfer() -> run() -> wait() -> fetch_results()
//! ```
//!
//! `stage`, `transfer` and `run` act on every Runner at once; there is one
//! master script and one remote command per submission. Completion is only
//! learned by pulling and parsing the manifest.

mod pipeline;
mod poll;

use chrono::NaiveDateTime;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::{ExecOptions, ExecOverrides, Settings};
use crate::error::ProcessError;
use crate::files::{Dirs, ProcessFiles, RunnerFiles};
use crate::host::Host;
use crate::payload::{CallArguments, Payload};
use crate::runner::{Runner, RunnerResult};
use crate::timeout::WaitConfig;
use remora_manifest::SHORT_ID_LEN;

/// Argument key listing extra files to push with a Runner
pub const EXTRA_SEND_KEY: &str = "extra_files_send";

/// Argument key listing extra files to pull back for a Runner
pub const EXTRA_RECV_KEY: &str = "extra_files_recv";

/// Orchestrator of one job
#[derive(Debug)]
pub struct Process {
    payload: Box<dyn Payload>,
    name: String,
    identity: String,
    short_id: String,
    host: Host,
    dirs: Dirs,
    options: ExecOptions,
    wait_config: WaitConfig,
    runners: Vec<Runner>,
    by_identity: HashMap<String, usize>,
    files: ProcessFiles,
    /// Timestamp of this Process's first submission; older manifest events
    /// belong to someone else.
    cutoff: Option<NaiveDateTime>,
    stdout: String,
    stderr: String,
}

impl Process {
    pub fn new(payload: impl Payload + 'static, host: Host, dirs: Dirs) -> Self {
        let name = format!("Process-{}", payload.name());
        let identity = payload.identity();
        let short_id = identity.chars().take(SHORT_ID_LEN).collect();
        let files = ProcessFiles::for_process(&name, &dirs);
        Self {
            payload: Box::new(payload),
            name,
            identity,
            short_id,
            host,
            dirs,
            options: ExecOptions::default(),
            wait_config: WaitConfig::default(),
            runners: Vec::new(),
            by_identity: HashMap::new(),
            files,
            cutoff: None,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Host, directories, default options and wait bounds from settings
    pub fn from_settings(payload: impl Payload + 'static, settings: &Settings) -> Self {
        let dirs = Dirs::new(settings.exec.local_dir.clone(), settings.exec.remote_dir.clone());
        Self::new(payload, Host::from_settings(settings), dirs)
            .with_options(ExecOptions {
                asynchronous: settings.exec.asynchronous,
                ..ExecOptions::default()
            })
            .with_wait(WaitConfig::new(
                settings.wait.interval(),
                settings.wait.timeout(),
            ))
    }

    /// Rename the Process. Only meaningful before the first `prepare`.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self.files = ProcessFiles::for_process(&self.name, &self.dirs);
        self
    }

    pub fn with_options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_wait(mut self, wait_config: WaitConfig) -> Self {
        self.wait_config = wait_config;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Content hash of the job's source
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Producer id of the Process itself in the manifest
    pub fn short_id(&self) -> &str {
        &self.short_id
    }

    pub fn payload(&self) -> &dyn Payload {
        self.payload.as_ref()
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn dirs(&self) -> &Dirs {
        &self.dirs
    }

    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    pub fn files(&self) -> &ProcessFiles {
        &self.files
    }

    pub fn runners(&self) -> &[Runner] {
        &self.runners
    }

    pub fn runner(&self, index: usize) -> Option<&Runner> {
        self.runners.get(index)
    }

    /// Stdout the master script recorded under the Process in the manifest
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Stderr the master script recorded under the Process in the manifest
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Push `path` with every submission, integrity-checked for every Runner
    pub fn add_extra_send(&mut self, path: impl Into<PathBuf>) {
        let file = self.dirs.extra_send(&path.into());
        self.files.extra_send.push(file);
    }

    /// Pull `name` from the remote directory in `fetch_results`
    pub fn add_extra_recv(&mut self, name: &str) {
        let file = self.dirs.extra_recv(name);
        self.files.extra_recv.push(file);
    }

    /// Create a Runner for one argument binding, or return the index of the
    /// existing Runner with the same arguments.
    ///
    /// Keys matching the payload's declared parameters become call
    /// arguments (missing ones are null). `asynchronous`, `force` and `skip`
    /// become this Runner's option overrides; `extra_files_send` and
    /// `extra_files_recv` list its extra files. Anything else is rejected.
    pub fn prepare(&mut self, mut values: Map<String, Value>) -> Result<usize, ProcessError> {
        let overrides = ExecOverrides::take_from(&mut values)?;
        let send = take_file_list(&mut values, EXTRA_SEND_KEY)?;
        let recv = take_file_list(&mut values, EXTRA_RECV_KEY)?;
        let arguments = CallArguments::bind(self.payload.declared_params(), &mut values);

        if !values.is_empty() {
            let unknown: Vec<&str> = values.keys().map(String::as_str).collect();
            return Err(ProcessError::UnknownArgument(unknown.join(", ")));
        }

        let identity = arguments.identity()?;
        if let Some(&index) = self.by_identity.get(&identity) {
            debug!(process = %self.name, index, "reusing runner with identical arguments");
            return Ok(index);
        }

        let index = self.runners.len();
        let name = format!("{}-runner-{}", self.name, index);
        let mut files = RunnerFiles::for_runner(&name, &self.dirs);
        files.extra_send = send.iter().map(|p| self.dirs.extra_send(Path::new(p))).collect();
        files.extra_recv = recv.iter().map(|n| self.dirs.extra_recv(n)).collect();

        let runner = Runner::new(name, arguments, overrides, files)?;
        debug!(process = %self.name, runner = %runner.name(), id = %runner.short_id(), "prepared runner");
        self.by_identity.insert(identity, index);
        self.runners.push(runner);
        Ok(index)
    }

    /// One entry per Runner, in preparation order. Runners with no
    /// observed outcome yet yield null.
    pub fn results(&self) -> Vec<RunnerResult> {
        self.runners
            .iter()
            .map(|r| r.result().cloned().unwrap_or(Ok(Value::Null)))
            .collect()
    }
}

fn take_file_list(values: &mut Map<String, Value>, key: &str) -> Result<Vec<String>, ProcessError> {
    let Some(value) = values.remove(key) else {
        return Ok(Vec::new());
    };
    let invalid = || ProcessError::InvalidArgument(format!("{} must be a list of strings", key));
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                _ => Err(invalid()),
            })
            .collect(),
        _ => Err(invalid()),
    }
}
