//! # stopguard-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`StopSettings::default()`]
//! 2. **Settings file**: `stopguard.json` or `--config <path>` (deep-merged over defaults)
//! 3. **Environment variables**: `STOPGUARD_*`, `ADMIN_SERVER_URL`, `PORT` (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, default_settings_path, load_settings_from_path, LoadedSettings,
    RejectedEnv,
};
pub use types::*;
