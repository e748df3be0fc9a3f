//! Runners: one concrete invocation of a Process's job
//!
//! A Runner owns its call arguments, its artifacts and its state. Local
//! pipeline steps set the state explicitly; manifest reconciliation only
//! ever moves it forward.

pub mod scripts;

use chrono::Utc;
use remora_manifest::ProducerLog;
use serde_json::Value;
use std::io;
use tracing::{debug, warn};

use crate::config::{ConfigError, ExecOptions, ExecOverrides};
use crate::error::RunnerFailedError;
use crate::files::RunnerFiles;
use crate::payload::{CallArguments, PayloadError};
use crate::state::{ChangeSource, RunnerState, StateChange, TerminalState};

/// Outcome of one Runner: the decoded return value, or its failure
pub type RunnerResult = Result<Value, RunnerFailedError>;

/// One argument binding of a Process's job
#[derive(Debug, Clone)]
pub struct Runner {
    name: String,
    arguments: CallArguments,
    identity: String,
    short_id: String,
    overrides: ExecOverrides,
    pub(crate) files: RunnerFiles,
    state: RunnerState,
    history: Vec<StateChange>,
    stdout: String,
    stderr: String,
    result: Option<RunnerResult>,
}

impl Runner {
    pub fn new(
        name: impl Into<String>,
        arguments: CallArguments,
        overrides: ExecOverrides,
        files: RunnerFiles,
    ) -> Result<Self, PayloadError> {
        let identity = arguments.identity()?;
        let short_id = arguments.short_identity()?;
        Ok(Self {
            name: name.into(),
            arguments,
            identity,
            short_id,
            overrides,
            files,
            state: RunnerState::Created,
            history: Vec::new(),
            stdout: String::new(),
            stderr: String::new(),
            result: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &CallArguments {
        &self.arguments
    }

    /// Full content hash of the call arguments
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Prefix of the identity used in the manifest and generated scripts
    pub fn short_id(&self) -> &str {
        &self.short_id
    }

    pub fn overrides(&self) -> &ExecOverrides {
        &self.overrides
    }

    pub fn files(&self) -> &RunnerFiles {
        &self.files
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Every state change observed so far, oldest first
    pub fn history(&self) -> &[StateChange] {
        &self.history
    }

    /// Stdout captured by the current generation
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Stderr captured by the current generation
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Result once fetched or once a failure was observed
    pub fn result(&self) -> Option<&RunnerResult> {
        self.result.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Options for this Runner: Process defaults, then this Runner's
    /// overrides, then the overrides of the current call.
    pub fn options(
        &self,
        defaults: &ExecOptions,
        call: &ExecOverrides,
    ) -> Result<ExecOptions, ConfigError> {
        defaults.resolve([&self.overrides, call])
    }

    /// Whether the pipeline step that leads to `target` must (re)run
    pub fn is_due(&self, options: &ExecOptions, target: RunnerState) -> bool {
        options.force || !options.skip || self.state.is_before(target)
    }

    /// Whether this Runner's artifacts must be (re)generated
    pub fn assess_run(&self, options: &ExecOptions) -> bool {
        self.is_due(options, RunnerState::Staged)
    }

    /// Set the state from a local pipeline step. May move backwards when a
    /// step is forced.
    pub(crate) fn set_state(&mut self, state: RunnerState) {
        self.record(state, ChangeSource::Local);
    }

    /// Open a new generation: the previous outcome no longer applies.
    pub(crate) fn begin_submission(&mut self) {
        self.result = None;
        self.stdout.clear();
        self.stderr.clear();
        self.set_state(RunnerState::Submitted);
    }

    /// Move forward from a manifest observation. Returns whether the state
    /// changed.
    pub fn advance(&mut self, state: RunnerState) -> bool {
        if !self.state.can_advance_to(state) {
            return false;
        }
        self.record(state, ChangeSource::Manifest);
        true
    }

    fn record(&mut self, state: RunnerState, source: ChangeSource) {
        debug!(runner = %self.name, from = %self.state, to = %state, ?source, "state change");
        self.state = state;
        self.history.push(StateChange {
            state,
            source,
            at: Utc::now(),
        });
    }

    /// Update state and captured output from this Runner's manifest log.
    ///
    /// Only the current generation counts. Unknown state tags are logged and
    /// skipped.
    pub fn reconcile(&mut self, log: &ProducerLog) {
        let generation = log.current_generation();
        self.stdout = generation.stdout();
        self.stderr = generation.stderr();

        for record in generation.states() {
            match record.tag() {
                Some(tag) => {
                    self.advance(RunnerState::from_tag(tag));
                }
                None => warn!(
                    runner = %self.name,
                    state = %record.state,
                    "ignoring unknown manifest state"
                ),
            }
        }

        if self.state.is_failed() && !matches!(self.result, Some(Err(_))) {
            self.result = Some(Err(self.failure()));
        }
    }

    fn failure(&self) -> RunnerFailedError {
        let message = if self.stderr.trim().is_empty() {
            "runner failed without output".to_string()
        } else {
            self.stderr.clone()
        };
        RunnerFailedError {
            runner: self.name.clone(),
            message,
        }
    }

    /// Record that this Runner's artifacts could not be pulled back
    pub(crate) fn fetch_failed(&mut self, message: impl Into<String>) {
        self.result = Some(Err(RunnerFailedError {
            runner: self.name.clone(),
            message: message.into(),
        }));
    }

    /// Decode the local result artifact of a completed Runner. Failed
    /// Runners keep their error; unfinished ones are left alone.
    pub(crate) fn load_result(&mut self) -> io::Result<()> {
        match self.state {
            RunnerState::Failed => {
                if !matches!(self.result, Some(Err(_))) {
                    self.result = Some(Err(self.failure()));
                }
            }
            RunnerState::Completed => {
                let value = match self.files.result.read() {
                    Ok(text) => Ok(decode_result(&text)),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Err(RunnerFailedError {
                        runner: self.name.clone(),
                        message: format!(
                            "completed but no result artifact at {}",
                            self.files.result.local_path().display()
                        ),
                    }),
                    Err(e) => return Err(e),
                };
                self.result = Some(value);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Decode a result artifact: JSON when it parses, otherwise a string.
/// Empty output is null.
pub fn decode_result(text: &str) -> Value {
    let text = text.trim_end_matches(['\n', '\r']);
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::Dirs;
    use remora_manifest::Manifest;
    use serde_json::{json, Map};
    use tempfile::TempDir;

    fn runner_in(dirs: &Dirs, x: Value) -> Runner {
        let mut values = Map::new();
        values.insert("x".to_string(), x);
        let args = CallArguments::bind(&["x".to_string()], &mut values);
        let files = RunnerFiles::for_runner("P-runner-0", dirs);
        Runner::new("P-runner-0", args, ExecOverrides::default(), files).unwrap()
    }

    fn runner(x: Value) -> Runner {
        runner_in(&Dirs::new("/l", "/r"), x)
    }

    fn log_for(runner: &Runner, body: &str) -> ProducerLog {
        let text = body.replace("ID", runner.short_id());
        Manifest::parse(&text)
            .producer(runner.short_id())
            .cloned()
            .unwrap_or_default()
    }

    #[test]
    fn test_identity_from_arguments() {
        let a = runner(json!(1));
        let b = runner(json!(1));
        let c = runner(json!(2));
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
        assert_eq!(a.short_id().len(), 8);
        assert!(a.identity().starts_with(a.short_id()));
    }

    #[test]
    fn test_assess_run() {
        let mut r = runner(json!(1));
        let defaults = ExecOptions::default();
        assert!(r.assess_run(&defaults));

        r.set_state(RunnerState::Staged);
        assert!(!r.assess_run(&defaults));
        assert!(r.is_due(&defaults, RunnerState::Transferred));

        let forced = r.options(&defaults, &ExecOverrides::forced()).unwrap();
        assert!(r.assess_run(&forced));

        let no_skip = ExecOptions {
            skip: false,
            ..defaults
        };
        assert!(r.assess_run(&no_skip));
    }

    #[test]
    fn test_runner_overrides_sit_between_defaults_and_call() {
        let mut r = runner(json!(1));
        r.overrides = ExecOverrides {
            asynchronous: Some(false),
            ..ExecOverrides::default()
        };
        let defaults = ExecOptions::default();
        assert!(!r.options(&defaults, &ExecOverrides::default()).unwrap().asynchronous);

        let call = ExecOverrides {
            asynchronous: Some(true),
            ..ExecOverrides::default()
        };
        assert!(r.options(&defaults, &call).unwrap().asynchronous);
    }

    #[test]
    fn test_reconcile_to_completion() {
        let mut r = runner(json!(1));
        r.begin_submission();
        let log = log_for(
            &r,
            "2024-03-01 10:00:00 [ID] submitted\n\
             2024-03-01 10:00:01 [ID] started\n\
             2024-03-01 10:00:02 [ID] [stdout] 42\n\
             2024-03-01 10:00:02 [ID] completed\n",
        );
        r.reconcile(&log);
        assert_eq!(r.state(), RunnerState::Completed);
        assert_eq!(r.stdout(), "42");
        assert!(r.result().is_none());
    }

    #[test]
    fn test_reconcile_failure_records_stderr() {
        let mut r = runner(json!(1));
        r.begin_submission();
        let log = log_for(
            &r,
            "2024-03-01 10:00:00 [ID] submitted\n\
             2024-03-01 10:00:01 [ID] started\n\
             2024-03-01 10:00:01 [ID] [stderr] integrity mismatch for a: expected x, got y\n\
             2024-03-01 10:00:01 [ID] failed\n",
        );
        r.reconcile(&log);
        assert_eq!(r.state(), RunnerState::Failed);
        let err = r.result().unwrap().as_ref().unwrap_err();
        assert!(err.message.contains("mismatch"));
        assert_eq!(err.runner, "P-runner-0");
    }

    #[test]
    fn test_reconcile_ignores_earlier_generations() {
        let mut r = runner(json!(1));
        r.begin_submission();
        let log = log_for(
            &r,
            "2024-03-01 10:00:00 [ID] submitted\n\
             2024-03-01 10:00:01 [ID] [stdout] old\n\
             2024-03-01 10:00:02 [ID] completed\n\
             2024-03-01 10:00:05 [ID] submitted\n\
             2024-03-01 10:00:06 [ID] started\n",
        );
        r.reconcile(&log);
        assert_eq!(r.state(), RunnerState::Running);
        assert_eq!(r.stdout(), "");
    }

    #[test]
    fn test_unknown_tags_are_skipped() {
        let mut r = runner(json!(1));
        r.begin_submission();
        let log = log_for(
            &r,
            "2024-03-01 10:00:00 [ID] submitted\n\
             2024-03-01 10:00:01 [ID] paused\n\
             2024-03-01 10:00:02 [ID] started\n",
        );
        r.reconcile(&log);
        assert_eq!(r.state(), RunnerState::Running);
    }

    #[test]
    fn test_history_is_monotonic_under_reconciliation() {
        let mut r = runner(json!(1));
        r.begin_submission();
        let log = log_for(
            &r,
            "2024-03-01 10:00:00 [ID] submitted\n\
             2024-03-01 10:00:02 [ID] completed\n\
             2024-03-01 10:00:03 [ID] started\n",
        );
        r.reconcile(&log);
        assert_eq!(r.state(), RunnerState::Completed);

        let observed: Vec<_> = r
            .history()
            .iter()
            .filter(|c| c.source == ChangeSource::Manifest)
            .map(|c| c.state)
            .collect();
        assert_eq!(observed, vec![RunnerState::Completed]);
    }

    #[test]
    fn test_load_result() {
        let tmp = TempDir::new().unwrap();
        let dirs = Dirs::new(tmp.path(), "/r");
        let mut r = runner_in(&dirs, json!(1));

        r.load_result().unwrap();
        assert!(r.result().is_none());

        r.set_state(RunnerState::Completed);
        r.load_result().unwrap();
        assert!(r.result().unwrap().is_err());

        r.files.result.write("{\"sum\": 3}\n").unwrap();
        r.load_result().unwrap();
        assert_eq!(r.result().unwrap().as_ref().unwrap(), &json!({"sum": 3}));
    }

    #[test]
    fn test_decode_result() {
        assert_eq!(decode_result(""), Value::Null);
        assert_eq!(decode_result("\n"), Value::Null);
        assert_eq!(decode_result("3"), json!(3));
        assert_eq!(decode_result("[1, 2]\n"), json!([1, 2]));
        assert_eq!(decode_result("hello world"), json!("hello world"));
        assert_eq!(decode_result("line one\nline two\n"), json!("line one\nline two"));
    }
}
