//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render the `/metrics` endpoint.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    tracing::info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Names shared by the server crate's counters, gauges and histograms.

/// WebSocket connections opened total (counter, labels: role).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter, labels: role).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge, labels: role).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Messages dropped because a recipient queue was full (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Inbound envelopes rejected (counter, labels: role, error_kind).
pub const ENVELOPE_ERRORS_TOTAL: &str = "envelope_errors_total";
/// Inbound envelopes with a type nobody handles (counter).
pub const ENVELOPE_UNHANDLED_TOTAL: &str = "envelope_unhandled_total";
/// Emergencies triggered (counter, labels: origin).
pub const EMERGENCIES_TOTAL: &str = "emergencies_total";
/// Collector forward attempts (counter, labels: outcome).
pub const COLLECTOR_FORWARDS_TOTAL: &str = "collector_forwards_total";
/// Collector forward duration seconds (histogram).
pub const COLLECTOR_FORWARD_DURATION_SECONDS: &str = "collector_forward_duration_seconds";
/// 1 while a call session is active (gauge).
pub const SESSION_ACTIVE: &str = "session_active";
/// Call-control dials (counter, labels: outcome).
pub const CALL_CONTROL_DIALS_TOTAL: &str = "call_control_dials_total";
