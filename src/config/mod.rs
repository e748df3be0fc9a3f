//! Configuration
//!
//! Two layered values:
//! 1. `Settings`: host binding, staging directories and wait bounds, merged
//!    from built-in defaults, `remora.toml` and CLI flags
//! 2. `ExecOptions`: execution flags, merged from Process defaults, Runner
//!    overrides and call-time overrides

mod defaults;
mod merge;
mod options;
mod settings;

pub use defaults::BuiltinDefaults;
pub use merge::{deep_merge, merge_layers};
pub use options::{ExecOptions, ExecOverrides, OPTION_KEYS};
pub use settings::{
    ConfigError, ConfigOrigin, ConfigSource, EffectiveSettings, ExecSettings, HostKind, HostSettings,
    Settings, WaitSettings, DEFAULT_SETTINGS_FILE,
};
