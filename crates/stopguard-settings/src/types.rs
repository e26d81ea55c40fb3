//! Settings types with compiled defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stopguard_core::device::{DeviceInfo, GeoPoint};
use stopguard_core::emergency::DEFAULT_EMERGENCY_MESSAGE;

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopSettings {
    pub server: ServerSettings,
    pub device: DeviceSettings,
    pub collector: CollectorSettings,
    pub call_control: CallControlSettings,
    pub logging: LoggingSettings,
}

impl StopSettings {
    /// Reject values the broker cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key, reason| Err(SettingsError::Invalid { key, reason });
        if self.collector.base_url.trim().is_empty() {
            return invalid("collector.base_url", "must not be empty");
        }
        if self.device.id.trim().is_empty() {
            return invalid("device.id", "must not be empty");
        }
        if self.server.outbound_queue == 0 {
            return invalid("server.outbound_queue", "must be greater than zero");
        }
        if self.collector.timeout_ms == 0 {
            return invalid("collector.timeout_ms", "must be greater than zero");
        }
        Ok(())
    }
}

/// HTTP/websocket listener.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Per-connection outbound queue capacity (messages).
    pub outbound_queue: usize,
    /// Upper bound on a single websocket write before the peer is dropped.
    pub send_timeout_ms: u64,
    /// Max inbound websocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8001,
            outbound_queue: 256,
            send_timeout_ms: 5_000,
            max_message_size: 64 * 1024,
        }
    }
}

impl ServerSettings {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Static identity of this stop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub webex_enabled: bool,
    /// Text carried by every emergency event from this stop.
    pub emergency_message: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            id: "songkok_busstop_450".into(),
            name: "송곡정류장".into(),
            lat: 37.540,
            lng: 127.070,
            webex_enabled: true,
            emergency_message: DEFAULT_EMERGENCY_MESSAGE.into(),
        }
    }
}

impl DeviceSettings {
    pub fn device_info(&self) -> DeviceInfo {
        let mut info = DeviceInfo::new(
            self.id.clone(),
            self.name.clone(),
            GeoPoint { lat: self.lat, lng: self.lng },
        );
        info.webex_enabled = self.webex_enabled;
        info
    }
}

/// Central collector that receives forwarded emergencies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorSettings {
    pub base_url: String,
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            base_url: "http://host.docker.internal:8000".into(),
            timeout_ms: 5_000,
            user_agent: concat!("StopGuard/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl CollectorSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Vendor call-control endpoint. Disabled when `endpoint` is unset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallControlSettings {
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
}

impl Default for CallControlSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 10_000,
        }
    }
}

impl CallControlSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Log output and metrics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default level; `RUST_LOG` wins when set.
    pub level: String,
    /// JSON lines on stdout when true, human-readable otherwise.
    pub json: bool,
    pub metrics_enabled: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: true,
            metrics_enabled: true,
        }
    }
}
