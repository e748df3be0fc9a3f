//! Runner-scoped failures and Process-fatal submission errors

mod fixtures;

use fixtures::{add, args, quick_wait, Canned, CannedTransport, Workspace};
use remora::runner::scripts::submission_lines;
use remora::{Host, ProcessError, RunnerState, ShellFunction};
use serde_json::json;
use std::fs::OpenOptions;
use std::io::Write;
use std::time::{Duration, Instant};

#[test]
fn test_corrupted_jobscript_fails_only_its_runner() {
    let ws = Workspace::new();
    let mut p = ws.process(add());
    p.prepare(args(json!({"a": 1, "b": 1}))).unwrap();
    p.prepare(args(json!({"a": 2, "b": 2}))).unwrap();
    assert!(p.transfer().unwrap());

    let mut jobscript = OpenOptions::new()
        .append(true)
        .open(ws.remote("Process-add-runner-1-jobscript.sh"))
        .unwrap();
    writeln!(jobscript, "# tampered").unwrap();

    assert!(p.run().unwrap());
    p.wait(quick_wait(30)).unwrap();
    p.fetch_results().unwrap();

    let results = p.results();
    assert_eq!(results[0], Ok(json!(2)));
    let err = results[1].as_ref().unwrap_err();
    assert_eq!(err.runner, "Process-add-runner-1");
    assert!(err.message.contains("mismatch"), "{}", err.message);
    assert_eq!(p.runners()[1].state(), RunnerState::Failed);
}

#[test]
fn test_function_failure_carries_its_stderr() {
    let ws = Workspace::new();
    let fail = ShellFunction::new("fail", ["code"], "echo partial\necho oops >&2\nexit \"$code\"").unwrap();
    let mut p = ws.process(fail);

    let results = p.run_direct(args(json!({"code": 3}))).unwrap();

    let err = results[0].as_ref().unwrap_err();
    assert_eq!(err.message, "oops");
    assert_eq!(p.runners()[0].stdout(), "partial");
}

#[test]
fn test_missing_receive_file_fails_only_its_runner() {
    let ws = Workspace::new();
    let emit = ShellFunction::new(
        "emit",
        ["x"],
        "if [ \"$x\" = 1 ]; then echo one > out1.txt; fi\necho \"$x\"",
    )
    .unwrap();
    let mut p = ws.process(emit);
    p.prepare(args(json!({"x": 1, "extra_files_recv": ["out1.txt"]}))).unwrap();

    let results = p
        .run_direct(args(json!({"x": 2, "extra_files_recv": ["out2.txt"]})))
        .unwrap();

    assert_eq!(results[0], Ok(json!(1)));
    let err = results[1].as_ref().unwrap_err();
    assert_eq!(err.runner, "Process-emit-runner-1");
    assert!(err.message.contains("out2.txt"), "{}", err.message);
    assert_eq!(std::fs::read_to_string(ws.local("out1.txt")).unwrap(), "one\n");
}

#[test]
fn test_missing_submitter_fails_the_runner() {
    let ws = Workspace::new();
    let mut p = ws.process_on(add(), Host::local().with_submitter("foo"));

    let results = p.run_direct(args(json!({"a": 1, "b": 1}))).unwrap();

    let err = results[0].as_ref().unwrap_err();
    assert!(err.message.contains("command not found"), "{}", err.message);

    // the master copies the error under the Process right after failing the runner
    let deadline = Instant::now() + Duration::from_secs(5);
    while !p.stderr().contains("foo: command not found") && Instant::now() < deadline {
        p.is_finished().unwrap();
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(p.stderr().contains("foo: command not found"), "{}", p.stderr());
}

#[test]
fn test_missing_interpreter_fails_the_runner() {
    let ws = Workspace::new();
    let mut p = ws.process_on(add(), Host::local().with_interpreter("foo"));

    let results = p.run_direct(args(json!({"a": 1, "b": 1}))).unwrap();

    let err = results[0].as_ref().unwrap_err();
    assert!(err.message.contains("command not found"), "{}", err.message);
}

#[test]
fn test_missing_shell_is_a_submission_error() {
    let ws = Workspace::new();
    let mut p = ws.process_on(add(), Host::local().with_shell("foo"));
    p.prepare(args(json!({"a": 1, "b": 1}))).unwrap();

    let err = p.run().unwrap_err();

    assert!(matches!(err, ProcessError::Submission(_)), "{err}");
    assert_eq!(err.exit_code(), 30);
    assert_eq!(p.runners()[0].state(), RunnerState::Transferred);
    assert!(!p.files().manifest.exists_local());
}

const TS: &str = "2030-01-01 00:00:00";

fn canned_process(ws: &Workspace) -> (remora::Process, Canned) {
    let canned = Canned::default();
    let host = Host::new(CannedTransport::new(canned.clone()));
    let p = ws.process_on(add(), host);
    canned.set_submit(&format!("{} [{}] submitted\n", TS, p.short_id()), "");
    (p, canned)
}

#[test]
fn test_missing_liveness_echo_is_a_submission_error() {
    let ws = Workspace::new();
    let (mut p, canned) = canned_process(&ws);
    canned.set_submit("", "");
    p.prepare(args(json!({"a": 1, "b": 1}))).unwrap();

    let err = p.run().unwrap_err();
    assert!(err.to_string().contains("did not echo"), "{err}");
}

#[test]
fn test_significant_stderr_is_a_submission_error() {
    let ws = Workspace::new();
    let (mut p, canned) = canned_process(&ws);
    let echo = format!("{} [{}] submitted\n", TS, p.short_id());
    canned.set_submit(&echo, "bash: Process-add-master.sh: Permission denied\n");
    p.prepare(args(json!({"a": 1, "b": 1}))).unwrap();

    assert!(matches!(p.run(), Err(ProcessError::Submission(_))));
}

#[test]
fn test_locale_noise_is_not_an_error() {
    let ws = Workspace::new();
    let (mut p, canned) = canned_process(&ws);
    let echo = format!("{} [{}] submitted\n", TS, p.short_id());
    canned.set_submit(&echo, "bash: warning: setlocale: LC_ALL: cannot change locale (en_US.UTF-8)\n");
    p.prepare(args(json!({"a": 1, "b": 1}))).unwrap();

    assert!(p.run().unwrap());
    assert_eq!(p.runners()[0].state(), RunnerState::Running);
    let commands = canned.commands();
    assert_eq!(commands.len(), 1);
    assert!(commands[0].ends_with("bash Process-add-master.sh"), "{}", commands[0]);
}

#[test]
fn test_submitter_not_found_on_a_submission_line_aborts_early() {
    let ws = Workspace::new();
    let (mut p, canned) = canned_process(&ws);
    p.prepare(args(json!({"a": 1, "b": 1}))).unwrap();
    assert!(p.run().unwrap());

    let master = p.files().master.read().unwrap();
    let (line, _) = submission_lines(&master)[0];
    let psid = p.short_id().to_string();
    let sid = p.runners()[0].short_id().to_string();
    canned.set_manifest(&format!(
        "{TS} [{psid}] submitted\n\
         {TS} [{sid}] submitted\n\
         {TS} [{psid}] [stderr] Process-add-master.sh: line {line}: foo: command not found\n"
    ));

    let err = p.is_finished().unwrap_err();
    assert!(matches!(err, ProcessError::Submission(_)), "{err}");
    assert!(err.to_string().contains(&format!("line {line}")), "{err}");
}

#[test]
fn test_not_found_elsewhere_is_left_to_the_runner() {
    let ws = Workspace::new();
    let (mut p, canned) = canned_process(&ws);
    p.prepare(args(json!({"a": 1, "b": 1}))).unwrap();
    assert!(p.run().unwrap());

    let psid = p.short_id().to_string();
    let sid = p.runners()[0].short_id().to_string();
    canned.set_manifest(&format!(
        "{TS} [{psid}] submitted\n\
         {TS} [{sid}] submitted\n\
         {TS} [{psid}] [stderr] Process-add-master.sh: line 1: foo: command not found\n"
    ));

    assert_eq!(p.is_finished().unwrap(), vec![false]);
}

#[test]
fn test_unknown_states_and_old_events_are_ignored() {
    let ws = Workspace::new();
    let (mut p, canned) = canned_process(&ws);
    p.prepare(args(json!({"a": 1, "b": 1}))).unwrap();
    assert!(p.run().unwrap());

    let psid = p.short_id().to_string();
    let sid = p.runners()[0].short_id().to_string();
    canned.set_manifest(&format!(
        "2029-12-31 23:59:59 [{sid}] completed\n\
         {TS} [{psid}] submitted\n\
         {TS} [{sid}] submitted\n\
         {TS} [{sid}] paused\n"
    ));
    assert_eq!(p.is_finished().unwrap(), vec![false]);
    assert_eq!(p.runners()[0].state(), RunnerState::Running);

    canned.set_manifest(&format!(
        "{TS} [{psid}] submitted\n\
         {TS} [{sid}] submitted\n\
         {TS} [{sid}] paused\n\
         {TS} [{sid}] started\n\
         {TS} [{sid}] [stdout] 2\n\
         2030-01-01 00:00:01 [{sid}] completed\n"
    ));
    assert_eq!(p.is_finished().unwrap(), vec![true]);
    assert_eq!(p.runners()[0].stdout(), "2");
    assert!(p.files().manifest.read().unwrap().contains("completed"));
}
