//! Inbound envelope routing for one connection.

use std::sync::Arc;

use chrono::Local;
use stopguard_core::envelope::{split_frame, Inbound, Outbound, Role};
use stopguard_core::errors::BrokerError;
use stopguard_telemetry::{CALL_CONTROL_DIALS_TOTAL, ENVELOPE_ERRORS_TOTAL, ENVELOPE_UNHANDLED_TOTAL};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::call_control::CallControl;
use crate::connection::Connection;
use crate::dispatcher::{Dispatch, EmergencyDispatcher, TriggerOrigin};
use crate::liveness;
use crate::registry::{Audience, BroadcastReport, ConnectionRegistry};

/// What handling one envelope did.
#[derive(Debug)]
pub enum RouteOutcome {
    Pong,
    Emergency(Dispatch),
    /// Session opened; carries the background dial when one was started.
    SessionOpened { dial: Option<JoinHandle<()>> },
    SessionClosed,
    AdminBroadcast(BroadcastReport),
    /// Well-formed but nothing to do (empty admin message).
    Ignored,
    Rejected(BrokerError),
    Unhandled(String),
}

#[derive(Clone)]
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    dispatcher: EmergencyDispatcher,
    call_control: Arc<dyn CallControl>,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        dispatcher: EmergencyDispatcher,
        call_control: Arc<dyn CallControl>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            call_control,
        }
    }

    /// Handle every envelope in a text frame, in order.
    pub fn handle_frame(&self, conn: &Arc<Connection>, frame: &str) -> Vec<RouteOutcome> {
        split_frame(frame)
            .map(|line| match Inbound::parse(line) {
                Ok(inbound) => self.handle_envelope(conn, inbound),
                Err(e) => self.reject(conn, e),
            })
            .collect()
    }

    pub fn handle_envelope(&self, conn: &Arc<Connection>, inbound: Inbound) -> RouteOutcome {
        debug!(conn_id = %conn.id, role = %conn.role, message_type = inbound.message_type(), "envelope received");

        if let Some(reply) = liveness::respond(&inbound) {
            let _ = conn.send_message(&reply);
            return RouteOutcome::Pong;
        }

        if inbound.is_operator_only()
            && (conn.role != Role::Operator || !self.registry.is_current_operator(&conn.id))
        {
            return self.reject(
                conn,
                BrokerError::RoleViolation {
                    message_type: inbound.message_type().to_string(),
                },
            );
        }

        match inbound {
            Inbound::EmergencyButton if conn.role == Role::Viewer => {
                RouteOutcome::Emergency(self.dispatcher.trigger(TriggerOrigin::Viewer))
            }
            Inbound::WebexConnectRequest { target } => self.open_session(conn, target),
            Inbound::WebexDisconnect => self.close_session(conn),
            Inbound::AdminMessage { content } => {
                if content.is_empty() {
                    debug!(conn_id = %conn.id, "empty admin message ignored");
                    return RouteOutcome::Ignored;
                }
                let report = self.registry.broadcast(
                    Audience::Viewers,
                    &Outbound::AdminMessage {
                        content,
                        timestamp: Local::now(),
                    },
                );
                info!(recipients = report.recipients, "admin message relayed");
                RouteOutcome::AdminBroadcast(report)
            }
            other => {
                let kind = other.message_type().to_string();
                metrics::counter!(ENVELOPE_UNHANDLED_TOTAL).increment(1);
                info!(conn_id = %conn.id, role = %conn.role, message_type = %kind, "unhandled message type");
                RouteOutcome::Unhandled(kind)
            }
        }
    }

    fn open_session(&self, conn: &Arc<Connection>, target: Option<String>) -> RouteOutcome {
        let now = Local::now();
        let device = match self.registry.activate_session(&conn.id, now) {
            Ok(device) => device,
            Err(e) => return self.reject(conn, e),
        };
        info!(conn_id = %conn.id, "call session established");
        let _ = conn.send_message(&Outbound::WebexConnectionEstablished {
            timestamp: now,
            device_info: device,
        });

        let dial = match target {
            Some(target) if self.call_control.is_enabled() => Some(self.spawn_dial(conn, target)),
            Some(target) => {
                debug!(dial_target = %target, "call control not configured, dial skipped");
                None
            }
            None => None,
        };
        RouteOutcome::SessionOpened { dial }
    }

    fn close_session(&self, conn: &Arc<Connection>) -> RouteOutcome {
        match self.registry.deactivate_session(&conn.id) {
            Ok(was_active) => {
                info!(conn_id = %conn.id, was_active, "call session terminated");
                let _ = conn.send_message(&Outbound::WebexConnectionTerminated {
                    timestamp: Local::now(),
                });
                RouteOutcome::SessionClosed
            }
            Err(e) => self.reject(conn, e),
        }
    }

    /// Dial in the background and report the result to the operator.
    fn spawn_dial(&self, conn: &Arc<Connection>, target: String) -> JoinHandle<()> {
        let call_control = Arc::clone(&self.call_control);
        let conn = Arc::clone(conn);
        tokio::spawn(async move {
            let result = match call_control.dial(&target).await {
                Ok(outcome) => {
                    metrics::counter!(CALL_CONTROL_DIALS_TOTAL, "outcome" => "success").increment(1);
                    info!(dial_target = %target, "dial succeeded");
                    Outbound::WebexDialResult {
                        target,
                        success: true,
                        detail: outcome.detail,
                    }
                }
                Err(e) => {
                    metrics::counter!(CALL_CONTROL_DIALS_TOTAL, "outcome" => "failure").increment(1);
                    warn!(dial_target = %target, error = %e, "dial failed");
                    Outbound::WebexDialResult {
                        target,
                        success: false,
                        detail: e.to_string(),
                    }
                }
            };
            let _ = conn.send_message(&result);
        })
    }

    /// Contain an error at this connection: operators are told, viewers
    /// only show up in the logs.
    pub fn reject(&self, conn: &Arc<Connection>, err: BrokerError) -> RouteOutcome {
        metrics::counter!(
            ENVELOPE_ERRORS_TOTAL,
            "role" => conn.role.as_str(),
            "error_kind" => err.error_kind()
        )
        .increment(1);
        warn!(conn_id = %conn.id, role = %conn.role, error_kind = err.error_kind(), error = %err, "envelope rejected");
        if conn.role == Role::Operator {
            let _ = conn.send_message(&Outbound::Error {
                message: err.to_string(),
            });
        }
        RouteOutcome::Rejected(err)
    }
}
