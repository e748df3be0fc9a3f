//! SSH transport: commands over `ssh`, files over `scp`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

use super::transport::{
    check_status, output_from, CommandOutput, ExecMode, FileQueue, TransferReport, Transport,
    TransportError,
};
use crate::config::HostSettings;
use crate::files::TrackedFile;
use crate::shell;

/// SSH transport configuration
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Remote host
    pub host: String,
    /// SSH user; None uses the ssh client's default
    pub user: Option<String>,
    /// SSH port (default 22)
    pub port: u16,
    /// Path to SSH private key
    pub key_path: Option<PathBuf>,
    /// Connection timeout in seconds
    pub connect_timeout_seconds: u64,
    /// Server alive interval for detecting dead connections
    pub server_alive_interval: u32,
    /// Server alive count max
    pub server_alive_count_max: u32,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: None,
            port: 22,
            key_path: None,
            connect_timeout_seconds: 30,
            server_alive_interval: 15,
            server_alive_count_max: 2,
        }
    }
}

impl SshConfig {
    pub fn from_settings(settings: &HostSettings) -> Self {
        Self {
            host: settings.host.clone().unwrap_or_default(),
            user: settings.user.clone(),
            port: settings.port,
            key_path: settings.key_path.clone(),
            connect_timeout_seconds: settings.connect_timeout_seconds,
            ..Self::default()
        }
    }

    /// `user@host`, or just `host`
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }
}

/// Remote host reached over SSH
#[derive(Debug)]
pub struct SshTransport {
    config: SshConfig,
    push: FileQueue,
    pull: FileQueue,
}

impl SshTransport {
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            push: FileQueue::default(),
            pull: FileQueue::default(),
        }
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Options shared by `ssh` and `scp`
    fn common_options(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_seconds),
            "-o".to_string(),
            format!("ServerAliveInterval={}", self.config.server_alive_interval),
            "-o".to_string(),
            format!("ServerAliveCountMax={}", self.config.server_alive_count_max),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
        ];

        if let Some(ref key_path) = self.config.key_path {
            args.push("-i".to_string());
            args.push(key_path.to_string_lossy().to_string());
        }

        args
    }

    /// Build `ssh` arguments for one remote command
    fn build_ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = self.common_options();
        args.push("-p".to_string());
        args.push(self.config.port.to_string());
        args.push(self.config.destination());
        args.push("--".to_string());
        args.push(command.to_string());
        args
    }

    /// Build `scp` arguments; `scp` spells the port `-P`
    fn build_scp_args(&self, sources: Vec<String>, target: String) -> Vec<String> {
        let mut args = self.common_options();
        args.push("-P".to_string());
        args.push(self.config.port.to_string());
        args.push("-q".to_string());
        args.extend(sources);
        args.push(target);
        args
    }

    fn remote_spec(&self, path: &str) -> String {
        format!("{}:{}", self.config.destination(), shell::quote(path))
    }

    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, TransportError> {
        debug!(program, ?args, "spawning");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| TransportError::Spawn {
                program: program.to_string(),
                source,
            })?;
        let output = output_from(output);
        if !output.success() {
            return Err(TransportError::Ssh(format!(
                "{} exited with {:?}: {}",
                program,
                output.status,
                output.stderr.trim()
            )));
        }
        Ok(output)
    }

    fn push_all(&self, files: &[TrackedFile]) -> Result<usize, TransportError> {
        if files.is_empty() {
            return Ok(0);
        }
        for file in files {
            if !file.exists_local() {
                return Err(TransportError::MissingFile(file.local_path().to_path_buf()));
            }
        }

        let dirs: Vec<String> = files
            .iter()
            .map(|f| f.remote_dir().to_string())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        let mkdir = format!("mkdir -p {}", shell::join(&dirs));
        self.exec(&mkdir, ExecMode::STRICT)?;

        // One scp per remote directory for files that keep their name;
        // renamed files go one by one.
        let mut batches: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for file in files {
            let local_name = file.local_path().file_name().map(|n| n.to_string_lossy().to_string());
            if local_name.as_deref() == Some(file.name()) && file.remote_path().ends_with(file.name()) {
                batches
                    .entry(format!("{}/", file.remote_dir()))
                    .or_default()
                    .push(file.local_path().to_string_lossy().to_string());
            } else {
                let args = self.build_scp_args(
                    vec![file.local_path().to_string_lossy().to_string()],
                    self.remote_spec(file.remote_path()),
                );
                self.run("scp", &args)?;
            }
        }
        for (dir, sources) in batches {
            let args = self.build_scp_args(sources, self.remote_spec(&dir));
            self.run("scp", &args)?;
        }

        Ok(files.len())
    }

    fn pull_all(&self, files: &[TrackedFile]) -> Result<usize, TransportError> {
        // One scp per local target directory
        let mut batches: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
        for file in files {
            let target = file
                .local_path()
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            std::fs::create_dir_all(&target)?;
            batches
                .entry(target)
                .or_default()
                .push(self.remote_spec(file.remote_path()));
        }
        for (target, sources) in batches {
            let args = self.build_scp_args(sources, target.to_string_lossy().to_string());
            self.run("scp", &args)?;
        }
        Ok(files.len())
    }
}

impl Transport for SshTransport {
    fn exec(&self, command: &str, mode: ExecMode) -> Result<CommandOutput, TransportError> {
        let args = self.build_ssh_args(command);
        debug!(host = %self.config.host, command, "ssh exec");

        let mut cmd = Command::new("ssh");
        cmd.args(&args).stdin(Stdio::null());

        if mode.asynchronous {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
            cmd.spawn().map_err(|source| TransportError::Spawn {
                program: "ssh".to_string(),
                source,
            })?;
            return Ok(CommandOutput::default());
        }

        let output = cmd.output().map_err(|source| TransportError::Spawn {
            program: "ssh".to_string(),
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

        let pushed = self.push_all(&push)?;
        let pulled = self.pull_all(&pull)?;

        info!(host = %self.config.host, pushed, pulled, "transfer complete");
        Ok(TransferReport { pushed, pulled })
    }
}
