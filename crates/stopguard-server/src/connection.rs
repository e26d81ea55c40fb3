//! One live duplex connection, as seen by the registry.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use stopguard_core::envelope::{Outbound, Role};
use stopguard_core::ids::ConnId;
use tokio::sync::mpsc;

/// Result of enqueueing a message for one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    /// Queue full (slow peer) or message could not be serialized.
    Dropped,
    /// Writer side is gone; the peer has disconnected.
    Closed,
}

/// A registered viewer or operator.
///
/// Outbound messages go through a bounded queue drained by the socket's
/// writer task, so enqueueing never waits on the network.
pub struct Connection {
    pub id: ConnId,
    pub role: Role,
    /// Transport peer address, when known.
    pub peer: Option<SocketAddr>,
    tx: mpsc::Sender<Arc<str>>,
    pub connected_at: Instant,
    dropped_messages: AtomicU64,
}

impl Connection {
    pub fn new(role: Role, peer: Option<SocketAddr>, tx: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            id: ConnId::new(),
            role,
            peer,
            tx,
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Create a connection together with the receiving end of its queue.
    pub fn channel(
        role: Role,
        peer: Option<SocketAddr>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(Self::new(role, peer, tx)), rx)
    }

    /// Enqueue an already-serialized payload.
    pub fn send(&self, payload: Arc<str>) -> SendOutcome {
        match self.tx.try_send(payload) {
            Ok(()) => SendOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Serialize `message` and enqueue it.
    pub fn send_message(&self, message: &Outbound) -> SendOutcome {
        match message.to_json() {
            Ok(json) => self.send(json.into()),
            Err(e) => {
                tracing::error!(
                    conn_id = %self.id,
                    event_type = message.event_type(),
                    error = %e,
                    "failed to serialize outbound message"
                );
                SendOutcome::Dropped
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}
