//! Emergency dispatch: one event, forwarded to the collector and fanned out
//! to every local connection, both detached from the trigger. Both tasks
//! run on the shutdown tracker so a stopping server can drain them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;
use stopguard_core::emergency::EmergencyEvent;
use stopguard_core::envelope::Outbound;
use stopguard_core::errors::BrokerError;
use stopguard_telemetry::{
    COLLECTOR_FORWARDS_TOTAL, COLLECTOR_FORWARD_DURATION_SECONDS, EMERGENCIES_TOTAL,
};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::collector::{CollectorClient, ForwardReceipt};
use crate::registry::{Audience, BroadcastReport, ConnectionRegistry};

/// What raised the emergency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOrigin {
    /// Local HTTP trigger standing in for the physical button.
    Button,
    /// `emergency_button` envelope from a viewer connection.
    Viewer,
}

impl TriggerOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Button => "button",
            Self::Viewer => "viewer",
        }
    }
}

/// Outcome of the most recent collector forward.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ForwardStatus {
    Pending,
    Delivered { status: u16 },
    Failed { error_kind: String, error: String },
}

/// Marker for the latest emergency. Observability only.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LastEmergency {
    pub timestamp: DateTime<Local>,
    pub bus_stop_id: u32,
    pub origin: TriggerOrigin,
    pub forward: ForwardStatus,
    #[serde(skip)]
    seq: u64,
}

/// Handles to the two detached effects of one trigger.
///
/// Dropping this does not cancel anything.
pub struct Dispatch {
    pub event: EmergencyEvent,
    pub forward: JoinHandle<Result<ForwardReceipt, BrokerError>>,
    pub fanout: JoinHandle<BroadcastReport>,
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatch")
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct EmergencyDispatcher {
    registry: Arc<ConnectionRegistry>,
    collector: Arc<dyn CollectorClient>,
    message: Arc<str>,
    last: Arc<Mutex<Option<LastEmergency>>>,
    seq: Arc<AtomicU64>,
    tasks: TaskTracker,
}

impl EmergencyDispatcher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        collector: Arc<dyn CollectorClient>,
        message: impl Into<Arc<str>>,
        tasks: TaskTracker,
    ) -> Self {
        Self {
            registry,
            collector,
            message: message.into(),
            last: Arc::new(Mutex::new(None)),
            seq: Arc::new(AtomicU64::new(0)),
            tasks,
        }
    }

    /// Build one event from the current device record and spawn its
    /// collector forward and local fan-out. Returns without waiting on
    /// either; failures are logged at the task boundary.
    pub fn trigger(&self, origin: TriggerOrigin) -> Dispatch {
        let device = self.registry.session().device();
        let event = EmergencyEvent::new(&device, &*self.message);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;

        metrics::counter!(EMERGENCIES_TOTAL, "origin" => origin.as_str()).increment(1);
        warn!(
            device_id = %event.device_id,
            bus_stop_id = event.bus_stop_id,
            origin = origin.as_str(),
            "emergency triggered"
        );
        *self.last.lock() = Some(LastEmergency {
            timestamp: event.timestamp,
            bus_stop_id: event.bus_stop_id,
            origin,
            forward: ForwardStatus::Pending,
            seq,
        });

        let forward = {
            let collector = Arc::clone(&self.collector);
            let last = Arc::clone(&self.last);
            let event = event.clone();
            self.tasks.spawn(async move {
                let started = Instant::now();
                let result = collector.forward(&event).await;
                metrics::histogram!(COLLECTOR_FORWARD_DURATION_SECONDS)
                    .record(started.elapsed().as_secs_f64());

                let status = match &result {
                    Ok(receipt) => {
                        metrics::counter!(COLLECTOR_FORWARDS_TOTAL, "outcome" => "delivered")
                            .increment(1);
                        info!(url = %receipt.url, status = receipt.status, "emergency forwarded to collector");
                        ForwardStatus::Delivered {
                            status: receipt.status,
                        }
                    }
                    Err(e) => {
                        metrics::counter!(COLLECTOR_FORWARDS_TOTAL, "outcome" => e.error_kind())
                            .increment(1);
                        error!(error_kind = e.error_kind(), error = %e, "collector forward failed");
                        ForwardStatus::Failed {
                            error_kind: e.error_kind().to_string(),
                            error: e.to_string(),
                        }
                    }
                };
                if let Some(marker) = last.lock().as_mut().filter(|m| m.seq == seq) {
                    marker.forward = status;
                }
                result
            })
        };

        let fanout = {
            let registry = Arc::clone(&self.registry);
            let message = Outbound::EmergencyActivated { data: event.clone() };
            self.tasks.spawn(async move {
                let report = registry.broadcast(Audience::All, &message);
                info!(
                    recipients = report.recipients,
                    delivered = report.delivered,
                    "emergency fanned out"
                );
                report
            })
        };

        Dispatch {
            event,
            forward,
            fanout,
        }
    }

    pub fn last_emergency(&self) -> Option<LastEmergency> {
        self.last.lock().clone()
    }
}
