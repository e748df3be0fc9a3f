//! Manifest polling, waiting and result collection

use remora_manifest::{Manifest, ProducerLog, StateTag};
use tracing::{debug, info, warn};

use super::Process;
use crate::error::{ProcessError, SubmissionError};
use crate::host::{ExecMode, TransportError};
use crate::runner::scripts::{command_not_found_lines, submission_lines};
use crate::runner::Runner;
use crate::shell;
use crate::state::RunnerState;
use crate::timeout::{Deadline, WaitConfig};

impl Process {
    /// Pull and parse the manifest, then report per Runner whether it has
    /// finished.
    pub fn is_finished(&mut self) -> Result<Vec<bool>, ProcessError> {
        self.refresh()?;
        Ok(self.runners.iter().map(Runner::is_finished).collect())
    }

    /// Whether every Runner has finished. False while any prepared Runner
    /// was never submitted.
    pub fn all_finished(&mut self) -> Result<bool, ProcessError> {
        Ok(self.is_finished()?.iter().all(|finished| *finished))
    }

    /// Submitted Runners not yet finished
    fn pending(&self) -> usize {
        self.runners
            .iter()
            .filter(|r| r.state().at_least(RunnerState::Submitted) && !r.is_finished())
            .count()
    }

    /// Poll until every submitted Runner has finished.
    ///
    /// Returns at once when no Runner ever reached RUNNING. Fails with
    /// [`ProcessError::Timeout`] once `config.timeout` has elapsed; nothing
    /// is cancelled remotely.
    pub fn wait(&mut self, config: WaitConfig) -> Result<(), ProcessError> {
        config
            .validate()
            .map_err(|e| ProcessError::InvalidArgument(e.to_string()))?;
        if !self
            .runners
            .iter()
            .any(|r| r.state().at_least(RunnerState::Running))
        {
            debug!(process = %self.name, "nothing running, not waiting");
            return Ok(());
        }

        let deadline = Deadline::start(config);
        loop {
            self.refresh()?;
            if self.pending() == 0 {
                info!(process = %self.name, elapsed = ?deadline.elapsed(), "all runners finished");
                return Ok(());
            }
            if !deadline.sleep_interval() {
                return Err(ProcessError::Timeout {
                    waited: deadline.elapsed(),
                    pending: self.pending(),
                });
            }
        }
    }

    /// Pull the artifacts of each completed Runner as one batch per Runner,
    /// then let every Runner decode its local result. A Runner whose batch
    /// cannot be pulled gets a [`RunnerFailedError`](crate::RunnerFailedError)
    /// and its siblings are still collected. Returns whether anything was
    /// pulled.
    pub fn fetch_results(&mut self) -> Result<bool, ProcessError> {
        let mut pulled = false;
        for runner in &mut self.runners {
            if runner.state() != RunnerState::Completed {
                runner.load_result()?;
                continue;
            }
            let transport = self.host.transport_mut();
            for file in runner.files.files_to_recv() {
                transport.queue_for_pull(file);
            }
            match transport.transfer() {
                Ok(report) => {
                    debug!(runner = %runner.name(), pulled = report.pulled, "fetched results");
                    pulled = true;
                    runner.load_result()?;
                }
                Err(e) => {
                    warn!(runner = %runner.name(), error = %e, "could not fetch results");
                    runner.fetch_failed(format!("could not fetch results: {}", e));
                }
            }
        }

        if pulled && !self.files.extra_recv.is_empty() {
            let transport = self.host.transport_mut();
            for file in self.files.files_to_recv() {
                transport.queue_for_pull(file);
            }
            transport.transfer()?;
        }
        Ok(pulled)
    }

    /// Reconcile Runners and the Process itself with the remote manifest.
    ///
    /// Nothing is read before this Process's first submission: whatever the
    /// manifest holds then was written by someone else.
    fn refresh(&mut self) -> Result<(), ProcessError> {
        let Some(cutoff) = self.cutoff else {
            debug!(process = %self.name, "not submitted yet");
            return Ok(());
        };

        let text = self.read_manifest()?;
        let manifest = Manifest::parse_since(&text, Some(cutoff));
        if manifest.orphaned_lines() > 0 {
            warn!(
                process = %self.name,
                lines = manifest.orphaned_lines(),
                "manifest starts with lines that belong to no event"
            );
        }

        for runner in &mut self.runners {
            if !runner.state().at_least(RunnerState::Submitted) {
                continue;
            }
            if let Some(log) = manifest.producer(runner.short_id()) {
                runner.reconcile(log);
            }
        }

        if let Some(log) = manifest.producer(&self.short_id) {
            self.reconcile_self(log)?;
        }
        self.check_submission_lines()
    }

    /// Read the remote manifest and keep a local copy. A missing manifest
    /// reads as empty.
    fn read_manifest(&self) -> Result<String, ProcessError> {
        let command = format!("cat {}", shell::quote(self.files.manifest.remote_path()));
        let output = self.host.transport().exec(&command, ExecMode::LENIENT)?;
        if !output.success() {
            if output.stderr.contains("No such file") {
                return Ok(String::new());
            }
            return Err(TransportError::CommandFailed {
                command,
                status: output.status,
                stderr: output.stderr,
            }
            .into());
        }
        self.files.manifest.write(&output.stdout)?;
        Ok(output.stdout)
    }

    fn reconcile_self(&mut self, log: &ProducerLog) -> Result<(), ProcessError> {
        let generation = log.current_generation();
        self.stdout = generation.stdout();
        self.stderr = generation.stderr();

        for record in generation.states() {
            match record.tag() {
                Some(StateTag::Failed) => {
                    return Err(SubmissionError::new(format!(
                        "master script recorded a failure: {}",
                        self.stderr.trim()
                    ))
                    .into());
                }
                Some(_) => {}
                None => warn!(
                    process = %self.name,
                    state = %record.state,
                    "ignoring unknown manifest state"
                ),
            }
        }
        Ok(())
    }

    /// Fail early when the shell reported the submitter missing on a
    /// submission line whose Runner was never marked failed. Waiting would
    /// only run into the timeout.
    fn check_submission_lines(&self) -> Result<(), ProcessError> {
        let reported = command_not_found_lines(&self.stderr);
        if reported.is_empty() {
            return Ok(());
        }
        let master = match self.files.master.read() {
            Ok(master) => master,
            Err(e) => {
                debug!(error = %e, "no local master script to check");
                return Ok(());
            }
        };

        for (number, line) in submission_lines(&master) {
            if !reported.contains(&number) {
                continue;
            }
            let stuck = self
                .runners
                .iter()
                .find(|r| line.contains(r.short_id()) && !r.is_finished());
            if let Some(runner) = stuck {
                return Err(SubmissionError::new(format!(
                    "submitter `{}` not found at line {} of {} (runner {})",
                    self.host.submitter,
                    number,
                    self.files.master.name(),
                    runner.name()
                ))
                .into());
            }
        }
        Ok(())
    }
}
