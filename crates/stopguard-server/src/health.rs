//! `/health` endpoint body.

use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process serves requests.
    pub status: String,
    pub uptime_secs: u64,
    /// Registered viewers plus the operator, if any.
    pub connections: usize,
    pub session_active: bool,
}

pub fn health_check(start_time: Instant, connections: usize, session_active: bool) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        session_active,
    }
}
