//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`StopSettings::default()`]
//! 2. If a settings file exists, deep-merge its values over the defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Loading runs before logging is up, so nothing here logs. What the
//! caller should report comes back in [`LoadedSettings`].

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::{Result, SettingsError};
use crate::types::StopSettings;

/// An environment override that was set but unusable, and so ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedEnv {
    pub key: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Validated settings plus what the caller should log once logging is up.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedSettings {
    pub settings: StopSettings,
    /// Whether the settings file existed and was merged.
    pub from_file: bool,
    pub rejected_env: Vec<RejectedEnv>,
}

/// Settings file used when no path is given on the command line.
pub fn default_settings_path() -> PathBuf {
    PathBuf::from("stopguard.json")
}

/// Load settings from `path` (defaults if it does not exist), then apply
/// env var overrides and validate.
pub fn load_settings_from_path(path: &Path) -> Result<LoadedSettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

fn load_with_env<F>(path: &Path, lookup: F) -> Result<LoadedSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let schema_error = |source: serde_json::Error| SettingsError::Schema {
        path: path.to_path_buf(),
        source,
    };
    let defaults = serde_json::to_value(StopSettings::default()).map_err(schema_error)?;

    let from_file = path.exists();
    let merged = if from_file {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        defaults
    };

    let mut settings: StopSettings = serde_json::from_value(merged).map_err(schema_error)?;
    let rejected_env = apply_env_overrides(&mut settings, lookup);
    settings.validate()?;
    Ok(LoadedSettings {
        settings,
        from_file,
        rejected_env,
    })
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment overrides read through `lookup`.
///
/// `ADMIN_SERVER_URL` and `PORT` are the names deployed stops already set;
/// the `STOPGUARD_*` spellings take precedence when both are present.
/// Invalid values are skipped and returned so the caller can warn.
pub fn apply_env_overrides<F>(settings: &mut StopSettings, lookup: F) -> Vec<RejectedEnv>
where
    F: Fn(&str) -> Option<String>,
{
    let mut rejected = Vec::new();
    let mut reject = |key: &'static str, value: String, expected: &'static str| {
        rejected.push(RejectedEnv {
            key,
            value,
            expected,
        })
    };
    let read_string = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read_string("STOPGUARD_HOST") {
        settings.server.host = v;
    }
    for name in ["PORT", "STOPGUARD_PORT"] {
        if let Some(v) = read_string(name) {
            match parse_u16_range(&v, 1, 65535) {
                Some(port) => settings.server.port = port,
                None => reject(name, v, "a port between 1 and 65535"),
            }
        }
    }

    // ── Device ──────────────────────────────────────────────────────
    if let Some(v) = read_string("STOPGUARD_DEVICE_ID") {
        settings.device.id = v;
    }
    if let Some(v) = read_string("STOPGUARD_DEVICE_NAME") {
        settings.device.name = v;
    }

    // ── Collector ───────────────────────────────────────────────────
    for name in ["ADMIN_SERVER_URL", "STOPGUARD_COLLECTOR_URL"] {
        if let Some(v) = read_string(name) {
            settings.collector.base_url = v;
        }
    }
    if let Some(v) = read_string("STOPGUARD_COLLECTOR_TIMEOUT_MS") {
        match parse_u64_range(&v, 100, 60_000) {
            Some(ms) => settings.collector.timeout_ms = ms,
            None => reject(
                "STOPGUARD_COLLECTOR_TIMEOUT_MS",
                v,
                "milliseconds between 100 and 60000",
            ),
        }
    }

    // ── Call control ────────────────────────────────────────────────
    if let Some(v) = read_string("STOPGUARD_CALL_CONTROL_URL") {
        settings.call_control.endpoint = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_string("STOPGUARD_LOG_JSON") {
        match parse_bool(&v) {
            Some(b) => settings.logging.json = b,
            None => reject("STOPGUARD_LOG_JSON", v, "a boolean"),
        }
    }
    rejected
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
