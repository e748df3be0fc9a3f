//! Remote-side parallelism is controlled by the `asynchronous` option

mod fixtures;

use fixtures::{args, nap, quick_wait, Workspace};
use remora::ExecOptions;
use serde_json::json;
use std::time::{Duration, Instant};

const RUNNERS: i64 = 3;

fn run_naps(asynchronous: bool) -> Duration {
    let ws = Workspace::new();
    let mut p = ws.process(nap(1.0)).with_options(ExecOptions {
        asynchronous,
        ..ExecOptions::default()
    });
    for x in 0..RUNNERS {
        p.prepare(args(json!({ "x": x }))).unwrap();
    }

    let start = Instant::now();
    assert!(p.run().unwrap());
    p.wait(quick_wait(30)).unwrap();
    let elapsed = start.elapsed();

    p.fetch_results().unwrap();
    let expected: Vec<_> = (0..RUNNERS).map(|x| Ok(json!(format!("done-{}", x)))).collect();
    assert_eq!(p.results(), expected);
    elapsed
}

#[test]
fn test_asynchronous_runners_overlap() {
    let elapsed = run_naps(true);
    assert!(elapsed >= Duration::from_secs(1), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2500), "{:?}", elapsed);
}

#[test]
fn test_synchronous_runners_serialize() {
    let elapsed = run_naps(false);
    assert!(elapsed >= Duration::from_secs(3), "{:?}", elapsed);
}

#[test]
fn test_per_runner_override_serializes_one_runner() {
    let ws = Workspace::new();
    let mut p = ws.process(nap(0.1));
    p.prepare(args(json!({"x": 1, "asynchronous": false}))).unwrap();
    p.prepare(args(json!({"x": 2}))).unwrap();
    p.stage().unwrap();

    let master = p.files().master.read().unwrap();
    let lines: Vec<_> = remora::runner::scripts::submission_lines(&master)
        .into_iter()
        .map(|(_, line)| line.to_string())
        .collect();
    assert!(!lines[0].contains("</dev/null &"), "{}", lines[0]);
    assert!(lines[1].contains("</dev/null &"), "{}", lines[1]);
}
