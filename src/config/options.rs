//! Execution options
//!
//! `ExecOptions` is an immutable value. Overrides from a Runner or from a
//! single call are applied by merging layers, never by mutating shared state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::merge::merge_layers;
use super::settings::ConfigError;

/// Keys accepted as execution options by `prepare` and `run`
pub const OPTION_KEYS: [&str; 3] = ["asynchronous", "force", "skip"];

/// Fully resolved execution options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOptions {
    /// Background every Runner's submission inside the master script
    pub asynchronous: bool,
    /// Redo every pipeline step regardless of state
    pub force: bool,
    /// Skip pipeline steps a Runner has already passed
    pub skip: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            asynchronous: true,
            force: false,
            skip: true,
        }
    }
}

/// A partial layer of execution options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asynchronous: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<bool>,
}

impl ExecOverrides {
    pub fn is_empty(&self) -> bool {
        self.asynchronous.is_none() && self.force.is_none() && self.skip.is_none()
    }

    pub fn forced() -> Self {
        Self {
            force: Some(true),
            ..Self::default()
        }
    }

    /// Remove option keys from `map`, returning them as an override layer.
    ///
    /// Every option value must be a boolean.
    pub fn take_from(map: &mut Map<String, Value>) -> Result<Self, ConfigError> {
        let mut overrides = Self::default();
        for key in OPTION_KEYS {
            let Some(value) = map.remove(key) else {
                continue;
            };
            let flag = value.as_bool().ok_or_else(|| {
                ConfigError::ValidationError(format!("option {:?} must be a boolean, got {}", key, value))
            })?;
            match key {
                "asynchronous" => overrides.asynchronous = Some(flag),
                "force" => overrides.force = Some(flag),
                _ => overrides.skip = Some(flag),
            }
        }
        Ok(overrides)
    }
}

impl ExecOptions {
    /// Apply override layers in order; later layers win.
    pub fn resolve<'a, I>(&self, layers: I) -> Result<ExecOptions, ConfigError>
    where
        I: IntoIterator<Item = &'a ExecOverrides>,
    {
        let mut values = vec![to_value(self)?];
        for layer in layers {
            values.push(to_value(layer)?);
        }
        serde_json::from_value(merge_layers(values))
            .map_err(|e| ConfigError::ParseError(format!("invalid exec options: {}", e)))
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ConfigError> {
    serde_json::to_value(value).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let options = ExecOptions::default();
        assert!(options.asynchronous);
        assert!(!options.force);
        assert!(options.skip);
    }

    #[test]
    fn test_resolve_layers_in_order() {
        let process = ExecOptions::default();
        let runner = ExecOverrides {
            force: Some(true),
            asynchronous: Some(false),
            ..ExecOverrides::default()
        };
        let call = ExecOverrides {
            asynchronous: Some(true),
            ..ExecOverrides::default()
        };

        let resolved = process.resolve([&runner, &call]).unwrap();
        assert_eq!(
            resolved,
            ExecOptions {
                asynchronous: true,
                force: true,
                skip: true,
            }
        );
        // the base value is untouched
        assert!(!process.force);
    }

    #[test]
    fn test_resolve_without_layers() {
        let base = ExecOptions {
            asynchronous: false,
            force: false,
            skip: false,
        };
        assert_eq!(base.resolve([]).unwrap(), base);
    }

    #[test]
    fn test_take_from_splits_options() {
        let mut map = json!({"x": 1, "force": true, "skip": false})
            .as_object()
            .unwrap()
            .clone();

        let overrides = ExecOverrides::take_from(&mut map).unwrap();

        assert_eq!(overrides.force, Some(true));
        assert_eq!(overrides.skip, Some(false));
        assert_eq!(overrides.asynchronous, None);
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("x"));
    }

    #[test]
    fn test_take_from_rejects_non_bool() {
        let mut map = json!({"asynchronous": "yes"}).as_object().unwrap().clone();
        let err = ExecOverrides::take_from(&mut map).unwrap_err();
        assert!(err.to_string().contains("asynchronous"));
    }

    #[test]
    fn test_overrides_serialize_sparse() {
        let value = serde_json::to_value(ExecOverrides::forced()).unwrap();
        assert_eq!(value, json!({"force": true}));
        assert!(ExecOverrides::default().is_empty());
    }
}
