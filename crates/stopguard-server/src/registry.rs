//! Connection registry: the viewer set, the single operator slot, and
//! fan-out to either.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::RwLock;
use stopguard_core::device::DeviceInfo;
use stopguard_core::envelope::{Outbound, Role};
use stopguard_core::errors::BrokerError;
use stopguard_core::ids::ConnId;
use stopguard_telemetry::WS_BROADCAST_DROPS_TOTAL;
use tracing::{debug, info, warn};

use crate::connection::{Connection, SendOutcome};
use crate::session::SessionState;

/// Who a broadcast goes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Audience {
    Viewers,
    Operator,
    All,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewers => "viewers",
            Self::Operator => "operator",
            Self::All => "all",
        }
    }
}

/// Per-broadcast delivery summary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub recipients: usize,
    pub delivered: usize,
    pub dropped: usize,
    /// Recipients whose queue was closed; already unregistered.
    pub gone: Vec<ConnId>,
}

/// What happened when a connection was registered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegisterOutcome {
    /// Previous operator whose slot was taken over.
    pub superseded: Option<ConnId>,
    /// Whether an active session was ended by the takeover.
    pub session_evicted: bool,
}

#[derive(Default)]
struct Members {
    viewers: HashMap<ConnId, Arc<Connection>>,
    operator: Option<Arc<Connection>>,
}

/// Owns every live connection and the session bound to the operator.
pub struct ConnectionRegistry {
    members: RwLock<Members>,
    session: SessionState,
}

impl ConnectionRegistry {
    pub fn new(device: DeviceInfo) -> Self {
        Self {
            members: RwLock::new(Members::default()),
            session: SessionState::new(device),
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Add a connection. An operator takes over the operator slot; the old
    /// operator's socket is left open but loses its session.
    pub fn register(&self, conn: Arc<Connection>) -> RegisterOutcome {
        let mut outcome = RegisterOutcome::default();
        let mut gone = Vec::new();
        {
            let mut members = self.members.write();
            match conn.role {
                Role::Viewer => {
                    let _ = members.viewers.insert(conn.id.clone(), Arc::clone(&conn));
                }
                Role::Operator => {
                    if let Some(prev) = members.operator.replace(Arc::clone(&conn)) {
                        outcome.session_evicted = self.session.deactivate();
                        outcome.superseded = Some(prev.id.clone());
                        if outcome.session_evicted {
                            gone = Self::status_to_viewers(&members, false);
                        }
                    }
                }
            }
        }

        if let Some(prev) = &outcome.superseded {
            warn!(
                conn_id = %conn.id,
                superseded = %prev,
                session_evicted = outcome.session_evicted,
                "operator slot taken over"
            );
        }
        self.drop_gone(&gone);
        debug!(conn_id = %conn.id, role = %conn.role, "connection registered");
        outcome
    }

    /// Remove a connection. Returns the role it was registered under, or
    /// `None` for an unknown id or a superseded operator.
    pub fn unregister(&self, id: &ConnId) -> Option<Role> {
        let mut gone = Vec::new();
        let removed = {
            let mut members = self.members.write();
            if members.viewers.remove(id).is_some() {
                Some(Role::Viewer)
            } else if members.operator.as_ref().is_some_and(|op| &op.id == id) {
                members.operator = None;
                let _ = self.session.deactivate();
                gone = Self::status_to_viewers(&members, false);
                Some(Role::Operator)
            } else {
                None
            }
        };

        if removed == Some(Role::Operator) {
            info!(conn_id = %id, "operator left, session closed");
        }
        self.drop_gone(&gone);
        removed
    }

    /// Open the session on behalf of `id`, which must hold the operator slot.
    /// Viewers are told `connected: true` before the slot can change hands.
    pub fn activate_session(
        &self,
        id: &ConnId,
        now: DateTime<Local>,
    ) -> Result<DeviceInfo, BrokerError> {
        let (device, gone) = {
            let members = self.members.write();
            match &members.operator {
                Some(op) if &op.id == id => {
                    let device = self.session.activate(id, now);
                    (device, Self::status_to_viewers(&members, true))
                }
                _ => {
                    return Err(BrokerError::RoleViolation {
                        message_type: "webex_connect_request".into(),
                    })
                }
            }
        };
        self.drop_gone(&gone);
        Ok(device)
    }

    /// Close the session on behalf of `id`. Returns whether it was active.
    /// Viewers are told `connected: false` either way.
    pub fn deactivate_session(&self, id: &ConnId) -> Result<bool, BrokerError> {
        let (was_active, gone) = {
            let members = self.members.write();
            match &members.operator {
                Some(op) if &op.id == id => {
                    let was_active = self.session.deactivate();
                    (was_active, Self::status_to_viewers(&members, false))
                }
                _ => {
                    return Err(BrokerError::RoleViolation {
                        message_type: "webex_disconnect".into(),
                    })
                }
            }
        };
        self.drop_gone(&gone);
        Ok(was_active)
    }

    pub fn is_current_operator(&self, id: &ConnId) -> bool {
        self.members
            .read()
            .operator
            .as_ref()
            .is_some_and(|op| &op.id == id)
    }

    pub fn viewer_count(&self) -> usize {
        self.members.read().viewers.len()
    }

    pub fn has_operator(&self) -> bool {
        self.members.read().operator.is_some()
    }

    pub fn connection_count(&self) -> usize {
        let members = self.members.read();
        members.viewers.len() + usize::from(members.operator.is_some())
    }

    /// Send `message` to `audience`.
    ///
    /// Serializes once, snapshots recipients, and enqueues outside the lock.
    /// Recipients with a closed queue are unregistered afterwards.
    pub fn broadcast(&self, audience: Audience, message: &Outbound) -> BroadcastReport {
        let json: Arc<str> = match message.to_json() {
            Ok(j) => j.into(),
            Err(e) => {
                warn!(event_type = message.event_type(), error = %e, "failed to serialize broadcast");
                return BroadcastReport::default();
            }
        };

        let recipients = self.snapshot(audience);
        let mut report = BroadcastReport {
            recipients: recipients.len(),
            ..BroadcastReport::default()
        };
        for conn in &recipients {
            deliver(conn, &json, message.event_type(), &mut report);
        }
        debug!(
            event_type = message.event_type(),
            audience = audience.as_str(),
            recipients = report.recipients,
            delivered = report.delivered,
            "broadcast"
        );

        self.drop_gone(&report.gone);
        report
    }

    /// Enqueue a session status to every viewer. Called with the members
    /// lock held so status order on each queue follows state order.
    /// Returns viewers whose queue was closed.
    fn status_to_viewers(members: &Members, connected: bool) -> Vec<ConnId> {
        let message = Outbound::session_status(connected);
        let json: Arc<str> = match message.to_json() {
            Ok(j) => j.into(),
            Err(e) => {
                warn!(event_type = message.event_type(), error = %e, "failed to serialize status");
                return Vec::new();
            }
        };
        let mut report = BroadcastReport {
            recipients: members.viewers.len(),
            ..BroadcastReport::default()
        };
        for conn in members.viewers.values() {
            deliver(conn, &json, message.event_type(), &mut report);
        }
        debug!(connected, delivered = report.delivered, "session status sent to viewers");
        report.gone
    }

    fn drop_gone(&self, gone: &[ConnId]) {
        for id in gone {
            let err = BrokerError::TransportGone(id.clone());
            debug!(error = %err, "dropping closed connection after broadcast");
            let _ = self.unregister(id);
        }
    }

    fn snapshot(&self, audience: Audience) -> Vec<Arc<Connection>> {
        let members = self.members.read();
        let mut out = Vec::new();
        if matches!(audience, Audience::Viewers | Audience::All) {
            out.extend(members.viewers.values().cloned());
        }
        if matches!(audience, Audience::Operator | Audience::All) {
            out.extend(members.operator.iter().cloned());
        }
        out
    }
}

fn deliver(conn: &Connection, json: &Arc<str>, event_type: &str, report: &mut BroadcastReport) {
    match conn.send(Arc::clone(json)) {
        SendOutcome::Queued => report.delivered += 1,
        SendOutcome::Dropped => {
            report.dropped += 1;
            metrics::counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
            warn!(
                conn_id = %conn.id,
                event_type,
                dropped_total = conn.drop_count(),
                "outbound queue full, message dropped"
            );
        }
        SendOutcome::Closed => report.gone.push(conn.id.clone()),
    }
}
