//! Staging, transfer and submission
//!
//! Each step first runs the one before it. A step is due for a Runner when
//! it is forced, when skipping is disabled, or when the Runner has not yet
//! reached the step's target state.

use chrono::NaiveDateTime;
use serde_json::{Map, Value};
use std::io;
use tracing::{debug, info};

use super::Process;
use crate::config::{ExecOptions, ExecOverrides};
use crate::error::{ProcessError, SubmissionError};
use crate::host::ExecMode;
use crate::runner::scripts::{Binding, Bootstrap, Jobscript, MasterScript, Submission};
use crate::runner::RunnerResult;
use crate::shell;
use crate::state::RunnerState;
use crate::stderr::is_significant;
use remora_manifest::{parse_timestamp, TIMESTAMP_LEN};

impl Process {
    /// Generate artifacts for every Runner that needs them. Returns whether
    /// any jobscript was (re)generated.
    pub fn stage(&mut self) -> Result<bool, ProcessError> {
        self.stage_with(&ExecOverrides::default())
    }

    /// Stage, then push whatever is not yet on the remote host. Returns
    /// whether any Runner was transferred.
    pub fn transfer(&mut self) -> Result<bool, ProcessError> {
        self.transfer_with(&ExecOverrides::default())
    }

    /// Transfer, then issue the master script. Returns false, issuing
    /// nothing, when no Runner is due.
    pub fn run(&mut self) -> Result<bool, ProcessError> {
        self.run_with(&ExecOverrides::default())
    }

    /// `prepare`, `run`, `wait` with the configured bounds, `fetch_results`
    pub fn run_direct(&mut self, values: Map<String, Value>) -> Result<Vec<RunnerResult>, ProcessError> {
        self.prepare(values)?;
        self.run()?;
        self.wait(self.wait_config)?;
        self.fetch_results()?;
        Ok(self.results())
    }

    /// Resolved options of every Runner for one call
    fn plan(&self, call: &ExecOverrides) -> Result<Vec<ExecOptions>, ProcessError> {
        self.runners
            .iter()
            .map(|runner| runner.options(&self.options, call).map_err(ProcessError::from))
            .collect()
    }

    pub fn stage_with(&mut self, call: &ExecOverrides) -> Result<bool, ProcessError> {
        let plan = self.plan(call)?;
        let mut staged = 0;

        for (runner, options) in self.runners.iter_mut().zip(&plan) {
            if !runner.assess_run(options) {
                debug!(runner = %runner.name(), state = %runner.state(), "already staged");
                continue;
            }
            let script = Jobscript {
                short_id: runner.short_id(),
                process_name: &self.name,
                runner_name: runner.name(),
                function_name: self.payload.name(),
                interpreter: &self.host.interpreter,
                bootstrap: self.files.bootstrap.name(),
                manifest: self.files.manifest.name(),
            }
            .render();
            runner.files.jobscript.write(&script)?;
            runner.set_state(RunnerState::Staged);
            staged += 1;
        }

        self.write_bootstrap()?;
        self.write_master(&plan)?;
        info!(process = %self.name, staged, runners = self.runners.len(), "staged");
        Ok(staged > 0)
    }

    /// The bootstrap binds every Runner that has a jobscript, so one copy
    /// serves every submission.
    fn write_bootstrap(&self) -> Result<(), ProcessError> {
        let params = self.payload.declared_params();
        let shared = self
            .files
            .extra_send
            .iter()
            .map(|file| Ok((file.name().to_string(), file.sha256()?)))
            .collect::<io::Result<Vec<_>>>()?;

        let mut bindings = Vec::new();
        for runner in &self.runners {
            if !runner.files.jobscript.exists_local() {
                continue;
            }
            let mut checks = runner
                .files
                .integrity_checked()
                .map(|file| Ok((file.name().to_string(), file.sha256()?)))
                .collect::<io::Result<Vec<_>>>()?;
            checks.extend(shared.iter().cloned());
            bindings.push(Binding {
                short_id: runner.short_id().to_string(),
                args: runner.arguments().positional(params),
                result: runner.files.result.name().to_string(),
                checks,
            });
        }

        let source = self.payload.source();
        let script = Bootstrap {
            process_name: &self.name,
            function_source: &source,
            bindings: &bindings,
        }
        .render();
        self.files.bootstrap.write(&script)?;
        Ok(())
    }

    fn write_master(&self, plan: &[ExecOptions]) -> Result<(), ProcessError> {
        let submissions: Vec<Submission> = self
            .runners
            .iter()
            .zip(plan)
            .filter(|(runner, options)| runner.is_due(options, RunnerState::Submitted))
            .map(|(runner, options)| Submission {
                short_id: runner.short_id().to_string(),
                jobscript: runner.files.jobscript.name().to_string(),
                background: options.asynchronous,
            })
            .collect();

        let script = MasterScript {
            process_name: &self.name,
            process_short_id: &self.short_id,
            manifest: self.files.manifest.name(),
            submitter: &self.host.submitter,
            submissions: &submissions,
        }
        .render();
        self.files.master.write(&script)?;
        Ok(())
    }

    pub fn transfer_with(&mut self, call: &ExecOverrides) -> Result<bool, ProcessError> {
        self.stage_with(call)?;
        let plan = self.plan(call)?;

        let due: Vec<usize> = self
            .runners
            .iter()
            .zip(&plan)
            .enumerate()
            .filter(|(_, (runner, options))| runner.is_due(options, RunnerState::Transferred))
            .map(|(index, _)| index)
            .collect();

        let transport = self.host.transport_mut();
        for &index in &due {
            for file in self.runners[index].files.files_to_send() {
                transport.queue_for_push(file);
            }
        }
        for file in self.files.files_to_send() {
            transport.queue_for_push(file);
        }
        let report = transport.transfer()?;

        for &index in &due {
            self.runners[index].set_state(RunnerState::Transferred);
        }
        info!(process = %self.name, transferred = due.len(), pushed = report.pushed, "transferred");
        Ok(!due.is_empty())
    }

    pub fn run_with(&mut self, call: &ExecOverrides) -> Result<bool, ProcessError> {
        self.transfer_with(call)?;
        let plan = self.plan(call)?;

        let due: Vec<usize> = self
            .runners
            .iter()
            .zip(&plan)
            .enumerate()
            .filter(|(_, (runner, options))| runner.is_due(options, RunnerState::Submitted))
            .map(|(index, _)| index)
            .collect();
        if due.is_empty() {
            info!(process = %self.name, "nothing to run");
            return Ok(false);
        }

        let command = format!(
            "cd {} && {} {}",
            shell::quote(&self.dirs.remote),
            self.host.shell,
            shell::quote(self.files.master.name())
        );
        let output = self
            .host
            .transport()
            .exec(&command, ExecMode::LENIENT)
            .map_err(|e| SubmissionError::new(format!("could not issue `{}`: {}", command, e)))?;

        if is_significant(&output.stderr, &self.host.ignore_stderr) {
            return Err(SubmissionError::new(format!(
                "`{}` wrote to stderr: {}",
                command,
                output.stderr.trim()
            ))
            .into());
        }
        let submitted_at = self.liveness_echo(&output.stdout).ok_or_else(|| {
            SubmissionError::new(format!(
                "master script did not echo process id {} (stdout: {:?})",
                self.short_id,
                output.stdout.trim()
            ))
        })?;
        if self.cutoff.is_none() {
            self.cutoff = Some(submitted_at);
        }

        for &index in &due {
            let runner = &mut self.runners[index];
            runner.begin_submission();
            runner.set_state(RunnerState::Running);
        }
        info!(process = %self.name, submitted = due.len(), at = %submitted_at, "submitted");
        Ok(true)
    }

    /// Timestamp of the `<ts> [<process id>] submitted` line echoed by the
    /// master script
    fn liveness_echo(&self, stdout: &str) -> Option<NaiveDateTime> {
        let expected = format!(" [{}] submitted", self.short_id);
        stdout.lines().find_map(|line| {
            let line = line.trim_end();
            let rest = line.get(TIMESTAMP_LEN..)?;
            if rest != expected {
                return None;
            }
            parse_timestamp(line.get(..TIMESTAMP_LEN)?).ok()
        })
    }
}
