//! Effective settings with provenance
//!
//! Settings are merged from built-in defaults, an optional TOML file and
//! CLI overrides, then validated and decoded into typed sections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;

/// Default settings file name looked up in the working directory
pub const DEFAULT_SETTINGS_FILE: &str = "remora.toml";

/// Origin of a settings layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing settings layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of the raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// How commands and files reach the remote host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostKind {
    /// The "remote" is a directory on this machine
    Local,
    /// Commands over `ssh`, files over `scp`
    Ssh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSettings {
    pub kind: HostKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,
    pub shell: String,
    pub submitter: String,
    pub interpreter: String,
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecSettings {
    pub asynchronous: bool,
    pub local_dir: PathBuf,
    pub remote_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitSettings {
    pub interval_seconds: f64,
    pub timeout_seconds: f64,
}

impl WaitSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds)
    }
}

/// Typed, validated settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub host: HostSettings,
    pub exec: ExecSettings,
    pub wait: WaitSettings,
    /// Extra regexes for stderr lines that never count as a submission failure
    #[serde(default)]
    pub ignore_stderr: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let defaults = BuiltinDefaults::default();
        Settings {
            host: HostSettings {
                kind: HostKind::Local,
                host: None,
                user: None,
                port: defaults.port,
                key_path: None,
                shell: defaults.shell,
                submitter: defaults.submitter,
                interpreter: defaults.interpreter,
                connect_timeout_seconds: defaults.connect_timeout_seconds,
            },
            exec: ExecSettings {
                asynchronous: defaults.asynchronous,
                local_dir: PathBuf::from(defaults.local_dir),
                remote_dir: defaults.remote_dir,
            },
            wait: WaitSettings {
                interval_seconds: defaults.interval_seconds,
                timeout_seconds: defaults.timeout_seconds,
            },
            ignore_stderr: Vec::new(),
        }
    }
}

/// Effective settings plus where each layer came from
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveSettings {
    /// When these settings were computed
    pub created_at: DateTime<Utc>,

    pub settings: Settings,

    /// Contributing layers in precedence order
    pub sources: Vec<ConfigSource>,
}

impl EffectiveSettings {
    /// Build effective settings from layers.
    ///
    /// A missing `file` is skipped silently; an unreadable or malformed one
    /// is an error.
    pub fn build(file: Option<&Path>, cli_overrides: Option<Value>) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = file {
            if path.exists() {
                let (value, digest) = load_toml_file(path)?;
                layers.push(value);
                sources.push(ConfigSource {
                    origin: ConfigOrigin::File,
                    path: Some(path.to_string_lossy().to_string()),
                    digest: Some(digest),
                });
            }
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        let settings: Settings = serde_json::from_value(merged)
            .map_err(|e| ConfigError::ParseError(format!("invalid settings: {}", e)))?;
        validate(&settings)?;

        Ok(Self {
            created_at: Utc::now(),
            settings,
            sources,
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Load and parse a TOML file, returning the value and digest
fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path).map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

    let digest = hex::encode(Sha256::digest(&bytes));

    let contents = String::from_utf8(bytes)
        .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;

    let toml_value: toml::Value = toml::from_str(&contents)
        .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

    Ok((toml_to_json(toml_value), digest))
}

fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    let wait = &settings.wait;
    if wait.interval_seconds <= 0.0 {
        return Err(ConfigError::ValidationError(
            "wait.interval_seconds must be > 0".to_string(),
        ));
    }
    if wait.timeout_seconds <= 0.0 {
        return Err(ConfigError::ValidationError(
            "wait.timeout_seconds must be > 0".to_string(),
        ));
    }
    if wait.interval_seconds > wait.timeout_seconds {
        return Err(ConfigError::ValidationError(format!(
            "wait.interval_seconds must be <= wait.timeout_seconds ({})",
            wait.timeout_seconds
        )));
    }

    let host = &settings.host;
    if host.port == 0 {
        return Err(ConfigError::ValidationError("host.port must be != 0".to_string()));
    }
    if host.connect_timeout_seconds == 0 || host.connect_timeout_seconds > 300 {
        return Err(ConfigError::ValidationError(
            "host.connect_timeout_seconds must be in (0, 300]".to_string(),
        ));
    }
    if host.kind == HostKind::Ssh && host.host.as_deref().map_or(true, str::is_empty) {
        return Err(ConfigError::ValidationError(
            "host.host is required when host.kind = \"ssh\"".to_string(),
        ));
    }
    for (field, value) in [
        ("host.shell", &host.shell),
        ("host.submitter", &host.submitter),
        ("host.interpreter", &host.interpreter),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!("{} must not be empty", field)));
        }
    }

    for pattern in &settings.ignore_stderr {
        regex_lite::Regex::new(pattern).map_err(|e| {
            ConfigError::ValidationError(format!("invalid ignore_stderr pattern {:?}: {}", pattern, e))
        })?;
    }

    Ok(())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
