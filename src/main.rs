//! Remora CLI
//!
//! Entry point for the `remora` command-line tool.

use clap::{Parser, Subcommand};
use remora::config::DEFAULT_SETTINGS_FILE;
use remora::{EffectiveSettings, ExecOverrides, Process, ProcessError, ShellFunction, WaitConfig};
use remora_manifest::{parse_timestamp, Manifest};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Exit code when the run itself succeeded but some Runner failed
const RUNNER_FAILED_EXIT: i32 = 10;

#[derive(Parser)]
#[command(name = "remora")]
#[command(about = "Run shell functions on a remote host and collect their results", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a shell function once per argument set and print the results
    Run {
        /// File holding the function body
        #[arg(long)]
        function_file: PathBuf,

        /// Function name
        #[arg(long)]
        name: String,

        /// Declared parameter, in call order (repeatable)
        #[arg(long = "param")]
        params: Vec<String>,

        /// One argument set as a JSON object (repeatable)
        #[arg(long = "args")]
        args: Vec<String>,

        /// Run Runners one after another instead of concurrently
        #[arg(long)]
        sync: bool,

        /// Redo every step even for Runners that already ran
        #[arg(long)]
        force: bool,

        /// Seconds between manifest polls
        #[arg(long)]
        interval: Option<f64>,

        /// Seconds to wait for completion
        #[arg(long)]
        timeout: Option<f64>,

        /// Path to settings file (default: remora.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Reconstruct a manifest file
    Manifest {
        /// Manifest file
        file: PathBuf,

        /// Ignore events before this timestamp (YYYY-MM-DD HH:MM:SS)
        #[arg(long)]
        since: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the effective settings
    Config {
        /// Path to settings file (default: remora.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            function_file,
            name,
            params,
            args,
            sync,
            force,
            interval,
            timeout,
            config,
        } => {
            let overrides = cli_overrides(sync, interval, timeout);
            let request = RunRequest {
                function_file,
                name,
                params,
                args,
                force,
            };
            run_function(request, config, overrides);
        }
        Commands::Manifest { file, since, json } => {
            run_manifest(file, since, json);
        }
        Commands::Config { config } => {
            run_config(config);
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Settings layer built from command-line flags
fn cli_overrides(sync: bool, interval: Option<f64>, timeout: Option<f64>) -> Option<Value> {
    let mut layer = Map::new();
    if sync {
        layer.insert("exec".to_string(), json!({ "asynchronous": false }));
    }
    let mut wait = Map::new();
    if let Some(interval) = interval {
        wait.insert("interval_seconds".to_string(), json!(interval));
    }
    if let Some(timeout) = timeout {
        wait.insert("timeout_seconds".to_string(), json!(timeout));
    }
    if !wait.is_empty() {
        layer.insert("wait".to_string(), Value::Object(wait));
    }
    if layer.is_empty() {
        None
    } else {
        Some(Value::Object(layer))
    }
}

fn load_settings(config: Option<PathBuf>, overrides: Option<Value>) -> EffectiveSettings {
    let path = config.unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
    match EffectiveSettings::build(Some(&path), overrides) {
        Ok(effective) => effective,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(ProcessError::from(e).exit_code());
        }
    }
}

struct RunRequest {
    function_file: PathBuf,
    name: String,
    params: Vec<String>,
    args: Vec<String>,
    force: bool,
}

fn run_function(request: RunRequest, config: Option<PathBuf>, overrides: Option<Value>) {
    let effective = load_settings(config, overrides);

    let function = match ShellFunction::from_file(&request.name, &request.params, &request.function_file) {
        Ok(function) => function,
        Err(e) => {
            eprintln!("Error loading function: {}", e);
            process::exit(ProcessError::from(e).exit_code());
        }
    };
    let mut job = Process::from_settings(function, &effective.settings);

    let arg_sets = if request.args.is_empty() {
        vec!["{}".to_string()]
    } else {
        request.args
    };
    for text in &arg_sets {
        let values = match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(values)) => values,
            Ok(_) | Err(_) => {
                eprintln!("--args must be a JSON object, got: {}", text);
                process::exit(2);
            }
        };
        if let Err(e) = job.prepare(values) {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }

    let call = if request.force {
        ExecOverrides::forced()
    } else {
        ExecOverrides::default()
    };
    let wait = WaitConfig::new(
        effective.settings.wait.interval(),
        effective.settings.wait.timeout(),
    );

    let outcome = job
        .run_with(&call)
        .and_then(|_| job.wait(wait))
        .and_then(|_| job.fetch_results());
    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }

    let mut any_failed = false;
    let report: Vec<Value> = job
        .runners()
        .iter()
        .zip(job.results())
        .map(|(runner, result)| match result {
            Ok(value) => json!({ "runner": runner.name(), "result": value }),
            Err(e) => {
                any_failed = true;
                json!({ "runner": runner.name(), "error": e.message })
            }
        })
        .collect();

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }

    if any_failed {
        process::exit(RUNNER_FAILED_EXIT);
    }
}

fn run_manifest(file: PathBuf, since: Option<String>, json: bool) {
    let text = match std::fs::read_to_string(&file) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error reading {}: {}", file.display(), e);
            process::exit(1);
        }
    };
    let cutoff = match since.as_deref().map(parse_timestamp).transpose() {
        Ok(cutoff) => cutoff,
        Err(e) => {
            eprintln!("Invalid --since: {}", e);
            process::exit(2);
        }
    };
    let manifest = Manifest::parse_since(&text, cutoff);

    if json {
        match serde_json::to_string_pretty(&manifest) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    if manifest.is_empty() {
        println!("No events.");
        return;
    }
    for id in manifest.producers() {
        let Some(log) = manifest.producer(id) else {
            continue;
        };
        println!("[{}]", id);
        for record in log.states() {
            println!("  {}  {}", record.timestamp, record.state);
        }
        let stdout = log.stdout();
        if !stdout.is_empty() {
            println!("  stdout:");
            for line in stdout.lines() {
                println!("    {}", line);
            }
        }
        let stderr = log.stderr();
        if !stderr.is_empty() {
            println!("  stderr:");
            for line in stderr.lines() {
                println!("    {}", line);
            }
        }
    }
    if manifest.orphaned_lines() > 0 {
        println!();
        println!("{} line(s) before the first event were ignored", manifest.orphaned_lines());
    }
}

fn run_config(config: Option<PathBuf>) {
    let effective = load_settings(config, None);
    match effective.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}
