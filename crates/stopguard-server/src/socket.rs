//! Per-connection websocket lifecycle: register, read loop, bounded
//! writer, unregister.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use stopguard_core::envelope::{Outbound, Role};
use stopguard_core::errors::BrokerError;
use stopguard_settings::ServerSettings;
use stopguard_telemetry::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::connection::Connection;
use crate::registry::ConnectionRegistry;
use crate::router::MessageRouter;

/// Per-socket limits taken from server settings.
#[derive(Clone, Copy, Debug)]
pub struct SocketOptions {
    pub queue_capacity: usize,
    pub send_timeout: Duration,
}

impl From<&ServerSettings> for SocketOptions {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            queue_capacity: settings.outbound_queue,
            send_timeout: settings.send_timeout(),
        }
    }
}

/// Drive one upgraded websocket until the peer leaves or a write stalls.
pub async fn run_connection(
    socket: WebSocket,
    role: Role,
    peer: Option<SocketAddr>,
    registry: Arc<ConnectionRegistry>,
    router: MessageRouter,
    options: SocketOptions,
) {
    let (conn, rx) = Connection::channel(role, peer, options.queue_capacity);
    let _ = registry.register(Arc::clone(&conn));
    metrics::counter!(WS_CONNECTIONS_TOTAL, "role" => role.as_str()).increment(1);
    metrics::gauge!(WS_CONNECTIONS_ACTIVE, "role" => role.as_str()).increment(1.0);

    if role == Role::Operator {
        let _ = conn.send_message(&Outbound::ConnectionEstablished {
            device_info: registry.session().device(),
        });
    }

    drive(socket, &conn, rx, &router, options.send_timeout).await;

    let _ = registry.unregister(&conn.id);
    metrics::counter!(WS_DISCONNECTIONS_TOTAL, "role" => role.as_str()).increment(1);
    metrics::gauge!(WS_CONNECTIONS_ACTIVE, "role" => role.as_str()).decrement(1.0);
    info!(
        conn_id = %conn.id,
        role = %role,
        connected_secs = conn.age().as_secs(),
        dropped = conn.drop_count(),
        "connection closed"
    );
}

#[instrument(skip_all, fields(conn_id = %conn.id, role = %conn.role))]
async fn drive(
    socket: WebSocket,
    conn: &Arc<Connection>,
    mut rx: mpsc::Receiver<Arc<str>>,
    router: &MessageRouter,
    send_timeout: Duration,
) {
    info!(peer = ?conn.peer, "connection opened");
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            let send = ws_tx.send(WsMessage::Text(payload.as_ref().into()));
            match tokio::time::timeout(send_timeout, send).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(error = %e, "websocket write failed");
                    break;
                }
                Err(_) => {
                    warn!(timeout_ms = send_timeout.as_millis() as u64, "websocket write timed out, dropping peer");
                    break;
                }
            }
        }
    });

    let reader = async {
        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => {
                    let _ = router.handle_frame(conn, text.as_str());
                }
                Ok(WsMessage::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                    Ok(text) => {
                        let _ = router.handle_frame(conn, text);
                    }
                    Err(_) => {
                        let _ = router.reject(
                            conn,
                            BrokerError::BadEnvelope("binary frame is not UTF-8".into()),
                        );
                    }
                },
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "websocket read failed");
                    break;
                }
            }
        }
    };

    tokio::select! {
        () = reader => {}
        _ = &mut writer => {}
    }
    writer.abort();
}
