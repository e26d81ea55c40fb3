use crate::ids::ConnId;

/// Error taxonomy for the broker.
///
/// Every variant is contained at the component that detects it: none of
/// them closes a connection's read loop or reaches an emergency trigger's
/// caller.
#[derive(Clone, Debug, thiserror::Error)]
pub enum BrokerError {
    /// Inbound frame was not a well-formed envelope.
    #[error("bad envelope: {0}")]
    BadEnvelope(String),
    /// Operator-only action attempted by a connection that is not the
    /// current operator.
    #[error("{message_type} is reserved for the current operator")]
    RoleViolation { message_type: String },
    /// Peer is gone; the connection's outbound queue is closed.
    #[error("connection {0} is gone")]
    TransportGone(ConnId),
    /// Network error or timeout talking to the collector.
    #[error("collector unreachable at {url}: {cause}")]
    CollectorUnreachable { url: String, cause: String },
    /// Collector answered with something other than 200.
    #[error("collector rejected emergency with status {status}: {body}")]
    CollectorRejected { url: String, status: u16, body: String },
    /// Vendor call-control action failed or is not configured.
    #[error("call control failed: {0}")]
    CallControl(String),
}

impl BrokerError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::BadEnvelope(_) => "bad_envelope",
            Self::RoleViolation { .. } => "role_violation",
            Self::TransportGone(_) => "transport_gone",
            Self::CollectorUnreachable { .. } => "collector_unreachable",
            Self::CollectorRejected { .. } => "collector_rejected",
            Self::CallControl(_) => "call_control",
        }
    }

    /// Whether this error came from the collector forward.
    pub fn is_collector_failure(&self) -> bool {
        matches!(
            self,
            Self::CollectorUnreachable { .. } | Self::CollectorRejected { .. }
        )
    }
}

/// Truncate a response body for logging, respecting char boundaries.
pub fn truncate_body(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
