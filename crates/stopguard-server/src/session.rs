//! Remote-call session state and the stop's device record.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;
use stopguard_core::device::DeviceInfo;
use stopguard_core::ids::ConnId;
use stopguard_telemetry::SESSION_ACTIVE;

/// Point-in-time view of the session.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub active: bool,
    pub last_connection: Option<DateTime<Local>>,
    /// Operator connection the active session belongs to.
    pub operator: Option<ConnId>,
}

struct Inner {
    active: bool,
    operator: Option<ConnId>,
    device: DeviceInfo,
}

/// Whether a call session with the operator is live, plus the device
/// record whose `last_connection` only changes here.
///
/// Transitions are crate-private: the registry drives them while holding
/// its membership lock, which is what keeps `active` tied to a registered
/// operator.
pub struct SessionState {
    inner: Mutex<Inner>,
}

impl SessionState {
    pub fn new(device: DeviceInfo) -> Self {
        Self {
            inner: Mutex::new(Inner {
                active: false,
                operator: None,
                device,
            }),
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    /// Current device record, including `last_connection`.
    pub fn device(&self) -> DeviceInfo {
        self.inner.lock().device.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock();
        SessionSnapshot {
            active: inner.active,
            last_connection: inner.device.last_connection,
            operator: inner.operator.clone(),
        }
    }

    /// Mark the session live for `operator` and stamp `last_connection`.
    /// Returns the updated device record.
    pub(crate) fn activate(&self, operator: &ConnId, now: DateTime<Local>) -> DeviceInfo {
        let mut inner = self.inner.lock();
        inner.active = true;
        inner.operator = Some(operator.clone());
        inner.device.last_connection = Some(now);
        metrics::gauge!(SESSION_ACTIVE).set(1.0);
        inner.device.clone()
    }

    /// End the session. Returns whether it was active.
    pub(crate) fn deactivate(&self) -> bool {
        let mut inner = self.inner.lock();
        let was_active = inner.active;
        inner.active = false;
        inner.operator = None;
        metrics::gauge!(SESSION_ACTIVE).set(0.0);
        was_active
    }
}
