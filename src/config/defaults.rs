//! Built-in defaults (settings layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default settings values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Host kind (default: "local")
    pub host_kind: String,

    /// SSH port (default: 22)
    pub port: u16,

    /// Shell executing the master script (default: "bash")
    pub shell: String,

    /// Command launching each jobscript (default: "bash")
    pub submitter: String,

    /// Interpreter executing the remote bootstrap (default: "bash")
    pub interpreter: String,

    /// Connection timeout in seconds (default: 30)
    pub connect_timeout_seconds: u64,

    /// Background every Runner inside the master script (default: true)
    pub asynchronous: bool,

    /// Local staging directory (default: "temp_local")
    pub local_dir: String,

    /// Remote working directory (default: "temp_remote")
    pub remote_dir: String,

    /// Seconds between manifest polls (default: 1)
    pub interval_seconds: f64,

    /// Seconds before `wait` gives up (default: 600)
    pub timeout_seconds: f64,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            host_kind: "local".to_string(),
            port: 22,
            shell: "bash".to_string(),
            submitter: "bash".to_string(),
            interpreter: "bash".to_string(),
            connect_timeout_seconds: 30,
            asynchronous: true,
            local_dir: "temp_local".to_string(),
            remote_dir: "temp_remote".to_string(),
            interval_seconds: 1.0,
            timeout_seconds: 600.0,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to the JSON layout of a settings file for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "host": {
                "kind": self.host_kind,
                "port": self.port,
                "shell": self.shell,
                "submitter": self.submitter,
                "interpreter": self.interpreter,
                "connect_timeout_seconds": self.connect_timeout_seconds
            },
            "exec": {
                "asynchronous": self.asynchronous,
                "local_dir": self.local_dir,
                "remote_dir": self.remote_dir
            },
            "wait": {
                "interval_seconds": self.interval_seconds,
                "timeout_seconds": self.timeout_seconds
            },
            "ignore_stderr": []
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = BuiltinDefaults::default();
        assert_eq!(defaults.host_kind, "local");
        assert_eq!(defaults.shell, "bash");
        assert_eq!(defaults.submitter, "bash");
        assert_eq!(defaults.interpreter, "bash");
        assert!(defaults.asynchronous);
        assert_eq!(defaults.remote_dir, "temp_remote");
    }

    #[test]
    fn test_to_value() {
        let value = BuiltinDefaults::default().to_value();

        assert_eq!(value["host"]["kind"], "local");
        assert_eq!(value["exec"]["local_dir"], "temp_local");
        assert_eq!(value["wait"]["interval_seconds"], 1.0);
        assert!(value["ignore_stderr"].as_array().unwrap().is_empty());
    }
}
