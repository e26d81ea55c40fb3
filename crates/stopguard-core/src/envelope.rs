//! Websocket wire format.
//!
//! Every frame carries one or more newline-delimited JSON objects of the
//! form `{"type": "...", ...fields}`. Inbound objects decode into the closed
//! [`Inbound`] enum, with [`Inbound::Unknown`] for types this broker does not
//! handle; outbound messages are the [`Outbound`] enum.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::device::DeviceInfo;
use crate::emergency::EmergencyEvent;
use crate::errors::BrokerError;

/// Which endpoint a connection came in on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Operator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Operator => "operator",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded inbound envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    Ping,
    EmergencyButton,
    WebexConnectRequest { target: Option<String> },
    WebexDisconnect,
    AdminMessage { content: String },
    Unknown { kind: String },
}

impl Inbound {
    /// Decode one JSON envelope.
    pub fn parse(text: &str) -> Result<Self, BrokerError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| BrokerError::BadEnvelope(format!("invalid JSON: {e}")))?;
        let Value::Object(mut fields) = value else {
            return Err(BrokerError::BadEnvelope("envelope must be a JSON object".into()));
        };
        let Some(Value::String(kind)) = fields.remove("type") else {
            return Err(BrokerError::BadEnvelope("missing string field `type`".into()));
        };

        let inbound = match kind.as_str() {
            "ping" => Self::Ping,
            "emergency_button" => Self::EmergencyButton,
            "webex_connect_request" => Self::WebexConnectRequest {
                target: optional_string(&fields, &kind, "target")?,
            },
            "webex_disconnect" => Self::WebexDisconnect,
            "admin_message" => Self::AdminMessage {
                content: optional_string(&fields, &kind, "content")?.unwrap_or_default(),
            },
            _ => Self::Unknown { kind },
        };
        Ok(inbound)
    }

    /// The wire `type` string.
    pub fn message_type(&self) -> &str {
        match self {
            Self::Ping => "ping",
            Self::EmergencyButton => "emergency_button",
            Self::WebexConnectRequest { .. } => "webex_connect_request",
            Self::WebexDisconnect => "webex_disconnect",
            Self::AdminMessage { .. } => "admin_message",
            Self::Unknown { kind } => kind,
        }
    }

    /// Types that only the current operator may send.
    pub fn is_operator_only(&self) -> bool {
        matches!(
            self,
            Self::WebexConnectRequest { .. } | Self::WebexDisconnect | Self::AdminMessage { .. }
        )
    }
}

fn optional_string(
    fields: &Map<String, Value>,
    kind: &str,
    key: &str,
) -> Result<Option<String>, BrokerError> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(BrokerError::BadEnvelope(format!(
            "`{key}` of {kind} must be a string"
        ))),
    }
}

/// Split a frame into its newline-delimited envelopes, skipping blank lines.
pub fn split_frame(frame: &str) -> impl Iterator<Item = &str> {
    frame.lines().map(str::trim).filter(|line| !line.is_empty())
}

/// Messages the broker sends to connections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Pong,
    /// Greeting sent to an operator right after the handshake.
    ConnectionEstablished { device_info: DeviceInfo },
    WebexConnectionEstablished {
        timestamp: DateTime<Local>,
        device_info: DeviceInfo,
    },
    WebexConnectionTerminated { timestamp: DateTime<Local> },
    WebexConnectionStatus {
        connected: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        with: Option<String>,
    },
    AdminMessage {
        content: String,
        timestamp: DateTime<Local>,
    },
    EmergencyActivated { data: EmergencyEvent },
    WebexDialResult {
        target: String,
        success: bool,
        detail: String,
    },
    Error { message: String },
}

impl Outbound {
    pub fn session_status(connected: bool) -> Self {
        Self::WebexConnectionStatus {
            connected,
            with: connected.then(|| "admin".to_string()),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Pong => "pong",
            Self::ConnectionEstablished { .. } => "connection_established",
            Self::WebexConnectionEstablished { .. } => "webex_connection_established",
            Self::WebexConnectionTerminated { .. } => "webex_connection_terminated",
            Self::WebexConnectionStatus { .. } => "webex_connection_status",
            Self::AdminMessage { .. } => "admin_message",
            Self::EmergencyActivated { .. } => "emergency_activated",
            Self::WebexDialResult { .. } => "webex_dial_result",
            Self::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
