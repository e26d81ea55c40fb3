//! HTTP surface: websocket upgrades, the local emergency trigger, status
//! and observability endpoints.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, Extensions, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Local;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use stopguard_core::envelope::Role;
use stopguard_settings::StopSettings;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::call_control::{self, CallControl};
use crate::collector::{CollectorClient, HttpCollector};
use crate::dispatcher::{EmergencyDispatcher, TriggerOrigin};
use crate::health::{self, HealthResponse};
use crate::registry::ConnectionRegistry;
use crate::router::MessageRouter;
use crate::shutdown::ShutdownCoordinator;
use crate::socket::{self, SocketOptions};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub router: MessageRouter,
    pub dispatcher: EmergencyDispatcher,
    pub socket_options: SocketOptions,
    pub max_message_size: usize,
    pub start_time: Instant,
    pub metrics: Option<PrometheusHandle>,
}

pub struct StopServer {
    settings: StopSettings,
    state: AppState,
    shutdown: Arc<ShutdownCoordinator>,
}

impl StopServer {
    pub fn new(
        settings: StopSettings,
        collector: Arc<dyn CollectorClient>,
        call_control: Arc<dyn CallControl>,
    ) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let registry = Arc::new(ConnectionRegistry::new(settings.device.device_info()));
        let dispatcher = EmergencyDispatcher::new(
            Arc::clone(&registry),
            collector,
            settings.device.emergency_message.as_str(),
            shutdown.emergency_tasks(),
        );
        let router = MessageRouter::new(Arc::clone(&registry), dispatcher.clone(), call_control);
        let state = AppState {
            registry,
            router,
            dispatcher,
            socket_options: SocketOptions::from(&settings.server),
            max_message_size: settings.server.max_message_size,
            start_time: Instant::now(),
            metrics: None,
        };
        Self {
            settings,
            state,
            shutdown,
        }
    }

    /// Wire the HTTP collector and call control from settings. Fails when
    /// either HTTP client cannot be built.
    pub fn from_settings(settings: StopSettings) -> Result<Self, reqwest::Error> {
        let collector = Arc::new(HttpCollector::new(&settings.collector)?);
        let call_control = call_control::from_settings(&settings.call_control)?;
        Ok(Self::new(settings, collector, call_control))
    }

    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.state.metrics = handle;
        self
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(info_handler))
            .route("/status", get(status_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/emergency", post(emergency_handler))
            .route("/ws", get(viewer_ws_handler))
            .route("/ws/admin", get(operator_ws_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind and serve until the listener token is cancelled.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = tokio::net::TcpListener::bind(self.settings.server.bind_addr()).await?;
        let local_addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.listener_token();

        info!(
            addr = %local_addr,
            device_id = %self.settings.device.id,
            collector = %self.settings.collector.base_url,
            "stopguard listening"
        );

        let handle = tokio::spawn(async move {
            let serve = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "server error");
            }
        });
        Ok((local_addr, handle))
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.state.registry
    }

    pub fn dispatcher(&self) -> &EmergencyDispatcher {
        &self.state.dispatcher
    }

    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    pub fn settings(&self) -> &StopSettings {
        &self.settings
    }
}

async fn info_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "device": state.registry.session().device(),
        "status": "online",
        "timestamp": Local::now(),
    }))
}

async fn status_handler(State(state): State<AppState>) -> Json<Value> {
    let device = state.registry.session().device();
    Json(json!({
        "device_id": device.id,
        "name": device.name,
        "status": device.status,
        "webex_enabled": device.webex_enabled,
        "last_connection": device.last_connection,
        "session_active": state.registry.session().is_active(),
        "operator_connected": state.registry.has_operator(),
        "viewers": state.registry.viewer_count(),
        "last_emergency": state.dispatcher.last_emergency(),
        "timestamp": Local::now(),
    }))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.connection_count(),
        state.registry.session().is_active(),
    ))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

/// Local trigger standing in for the physical button. The body is optional
/// and only logged; the reply never waits on the collector.
async fn emergency_handler(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    if !body.is_empty() {
        match serde_json::from_slice::<Value>(&body) {
            Ok(payload) => info!(%payload, "emergency trigger received"),
            Err(e) => warn!(error = %e, "emergency trigger body is not JSON"),
        }
    }
    let _ = state.dispatcher.trigger(TriggerOrigin::Button);
    Json(json!({
        "status": "success",
        "message": "비상 신호를 전송했습니다.",
        "timestamp": Local::now(),
    }))
}

async fn viewer_ws_handler(
    ws: WebSocketUpgrade,
    extensions: Extensions,
    State(state): State<AppState>,
) -> Response {
    upgrade(ws, &extensions, state, Role::Viewer)
}

async fn operator_ws_handler(
    ws: WebSocketUpgrade,
    extensions: Extensions,
    State(state): State<AppState>,
) -> Response {
    upgrade(ws, &extensions, state, Role::Operator)
}

fn upgrade(ws: WebSocketUpgrade, extensions: &Extensions, state: AppState, role: Role) -> Response {
    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |ws_socket| {
            socket::run_connection(
                ws_socket,
                role,
                peer,
                state.registry,
                state.router,
                state.socket_options,
            )
        })
}
