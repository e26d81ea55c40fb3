//! Why a stop's settings could not be loaded.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read settings file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The settings file is not JSON.
    #[error("settings file {} is not valid JSON: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// The merged settings do not fit the schema, e.g. a string where a
    /// port number belongs.
    #[error("settings from {} do not fit the schema: {source}", .path.display())]
    Schema {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// A value the broker cannot run with.
    #[error("invalid {key}: {reason}")]
    Invalid {
        key: &'static str,
        reason: &'static str,
    },
}

impl SettingsError {
    /// Dotted settings key at fault, when one is known.
    pub fn key(&self) -> Option<&'static str> {
        match self {
            Self::Invalid { key, .. } => Some(key),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_error_names_the_file() {
        let err = SettingsError::Read {
            path: PathBuf::from("/etc/stopguard/stop_450.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/etc/stopguard/stop_450.json"), "{msg}");
        assert!(msg.contains("denied"), "{msg}");
        assert_eq!(err.key(), None);
    }

    #[test]
    fn invalid_value_names_the_key() {
        let err = SettingsError::Invalid {
            key: "collector.base_url",
            reason: "must not be empty",
        };
        assert_eq!(err.to_string(), "invalid collector.base_url: must not be empty");
        assert_eq!(err.key(), Some("collector.base_url"));
    }
}
