//! End-to-end tests against a live listener with real websocket clients.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stopguard_server::StopServer;
use stopguard_settings::StopSettings;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn boot(collector_url: &str, collector_timeout_ms: u64) -> (SocketAddr, StopServer) {
    let mut settings = StopSettings::default();
    settings.server.host = "127.0.0.1".into();
    settings.server.port = 0;
    settings.collector.base_url = collector_url.into();
    settings.collector.timeout_ms = collector_timeout_ms;
    let server = StopServer::from_settings(settings).unwrap();
    let (addr, _handle) = server.listen().await.unwrap();
    (addr, server)
}

async fn connect(addr: SocketAddr, route: &str) -> WsStream {
    let (ws, _) = timeout(TIMEOUT, connect_async(format!("ws://{addr}{route}")))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    ws
}

/// Connect a viewer and wait until the broker has registered it.
async fn connect_viewer(addr: SocketAddr) -> WsStream {
    let mut ws = connect(addr, "/ws").await;
    send(&mut ws, json!({"type": "ping"})).await;
    assert_eq!(next_json(&mut ws).await["type"], "pong");
    ws
}

/// Connect an operator and consume its greeting.
async fn connect_operator(addr: SocketAddr) -> WsStream {
    let mut ws = connect(addr, "/ws/admin").await;
    let greeting = next_json(&mut ws).await;
    assert_eq!(greeting["type"], "connection_established");
    ws
}

async fn send(ws: &mut WsStream, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

async fn next_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn assert_silent(ws: &mut WsStream) {
    assert!(
        timeout(Duration::from_millis(200), ws.next()).await.is_err(),
        "expected no further messages"
    );
}

async fn wait_for_requests(collector: &MockServer, count: usize) {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let seen = collector.received_requests().await.unwrap_or_default().len();
        if seen >= count {
            return;
        }
        assert!(Instant::now() < deadline, "collector saw {seen} of {count} requests");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn get_json(addr: SocketAddr, route: &str) -> Value {
    reqwest::get(format!("http://{addr}{route}"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn operator_receives_device_greeting() {
    let (addr, _server) = boot("http://127.0.0.1:1", 500).await;
    let mut op = connect(addr, "/ws/admin").await;
    let greeting = next_json(&mut op).await;
    assert_eq!(greeting["type"], "connection_established");
    assert_eq!(greeting["device_info"]["id"], "songkok_busstop_450");
    assert_eq!(greeting["device_info"]["status"], "online");
}

#[tokio::test]
async fn operator_drop_without_disconnect_closes_session() {
    let (addr, _server) = boot("http://127.0.0.1:1", 500).await;
    let mut viewer = connect_viewer(addr).await;
    let mut op = connect_operator(addr).await;

    send(&mut op, json!({"type": "webex_connect_request"})).await;
    let established = next_json(&mut op).await;
    assert_eq!(established["type"], "webex_connection_established");
    assert_eq!(
        next_json(&mut viewer).await,
        json!({"type": "webex_connection_status", "connected": true, "with": "admin"})
    );
    assert_eq!(get_json(addr, "/status").await["session_active"], true);

    drop(op);

    assert_eq!(
        next_json(&mut viewer).await,
        json!({"type": "webex_connection_status", "connected": false})
    );
    assert_silent(&mut viewer).await;
    let status = get_json(addr, "/status").await;
    assert_eq!(status["session_active"], false);
    assert_eq!(status["operator_connected"], false);
    assert!(status["last_connection"].is_string());
}

#[tokio::test]
async fn viewer_emergency_fans_out_once_and_forwards_once() {
    let collector = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/simulate-emergency/450"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"received": true})))
        .expect(1)
        .mount(&collector)
        .await;

    let (addr, _server) = boot(&collector.uri(), 2_000).await;
    let mut viewer = connect_viewer(addr).await;
    let mut other = connect_viewer(addr).await;
    let mut op = connect_operator(addr).await;

    send(&mut viewer, json!({"type": "emergency_button"})).await;

    for ws in [&mut viewer, &mut other, &mut op] {
        let msg = next_json(ws).await;
        assert_eq!(msg["type"], "emergency_activated");
        assert_eq!(msg["data"]["device_id"], "songkok_busstop_450");
        assert_eq!(msg["data"]["busStopId"], 450);
        assert_silent(ws).await;
    }

    wait_for_requests(&collector, 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let requests = collector.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["type"], "emergency_button");
}

#[tokio::test]
async fn viewer_emergency_with_unreachable_collector_still_fans_out() {
    let (addr, _server) = boot("http://127.0.0.1:1", 500).await;
    let mut viewer = connect_viewer(addr).await;

    send(&mut viewer, json!({"type": "emergency_button"})).await;
    assert_eq!(next_json(&mut viewer).await["type"], "emergency_activated");

    send(&mut viewer, json!({"type": "ping"})).await;
    assert_eq!(next_json(&mut viewer).await["type"], "pong");
}

#[tokio::test]
async fn http_trigger_returns_promptly_when_collector_fails() {
    let collector = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .expect(1)
        .mount(&collector)
        .await;

    let (addr, server) = boot(&collector.uri(), 2_000).await;
    let mut viewer = connect_viewer(addr).await;

    let started = Instant::now();
    let resp: Value = reqwest::Client::new()
        .post(format!("http://{addr}/emergency"))
        .json(&json!({"button": "pressed"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(resp["status"], "success");
    assert_eq!(next_json(&mut viewer).await["type"], "emergency_activated");

    wait_for_requests(&collector, 1).await;
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let last = server.dispatcher().last_emergency().unwrap();
        if let Ok(marker) = serde_json::to_value(&last) {
            if marker["forward"]["state"] == "failed" {
                assert_eq!(marker["forward"]["error_kind"], "collector_rejected");
                break;
            }
        }
        assert!(Instant::now() < deadline, "forward outcome never recorded");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn http_trigger_does_not_wait_on_slow_collector() {
    let collector = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&collector)
        .await;

    let (addr, _server) = boot(&collector.uri(), 5_000).await;
    let started = Instant::now();
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/emergency"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn admin_message_relayed_to_viewers() {
    let (addr, _server) = boot("http://127.0.0.1:1", 500).await;
    let mut viewer = connect_viewer(addr).await;
    let mut op = connect_operator(addr).await;

    send(&mut op, json!({"type": "admin_message", "content": ""})).await;
    send(&mut op, json!({"type": "admin_message", "content": "Help is coming"})).await;

    let msg = next_json(&mut viewer).await;
    assert_eq!(msg["type"], "admin_message");
    assert_eq!(msg["content"], "Help is coming");
    assert_silent(&mut viewer).await;
    assert_silent(&mut op).await;
}

#[tokio::test]
async fn viewer_role_violation_keeps_connection_open() {
    let (addr, _server) = boot("http://127.0.0.1:1", 500).await;
    let mut viewer = connect_viewer(addr).await;
    let mut other = connect_viewer(addr).await;

    send(&mut viewer, json!({"type": "admin_message", "content": "spoof"})).await;
    send(&mut viewer, json!({"type": "webex_connect_request"})).await;
    assert_silent(&mut other).await;

    send(&mut viewer, json!({"type": "ping"})).await;
    assert_eq!(next_json(&mut viewer).await["type"], "pong");
}

#[tokio::test]
async fn frame_with_several_envelopes_is_processed_in_order() {
    let (addr, _server) = boot("http://127.0.0.1:1", 500).await;
    let mut op = connect_operator(addr).await;

    op.send(Message::text(
        "{\"type\":\"ping\"}\nnot json\n{\"type\":\"webex_connect_request\"}",
    ))
    .await
    .unwrap();

    assert_eq!(next_json(&mut op).await["type"], "pong");
    assert_eq!(next_json(&mut op).await["type"], "error");
    assert_eq!(
        next_json(&mut op).await["type"],
        "webex_connection_established"
    );
}

#[tokio::test]
async fn binary_utf8_frames_are_accepted() {
    let (addr, _server) = boot("http://127.0.0.1:1", 500).await;
    let mut viewer = connect(addr, "/ws").await;
    viewer
        .send(Message::binary(br#"{"type":"ping"}"#.to_vec()))
        .await
        .unwrap();
    assert_eq!(next_json(&mut viewer).await["type"], "pong");
}

#[tokio::test]
async fn superseded_operator_stays_open_but_loses_authority() {
    let (addr, _server) = boot("http://127.0.0.1:1", 500).await;
    let mut viewer = connect_viewer(addr).await;
    let mut first = connect_operator(addr).await;

    send(&mut first, json!({"type": "webex_connect_request"})).await;
    assert_eq!(next_json(&mut first).await["type"], "webex_connection_established");
    assert_eq!(next_json(&mut viewer).await["connected"], true);

    let mut second = connect_operator(addr).await;
    assert_eq!(next_json(&mut viewer).await["connected"], false);

    send(&mut first, json!({"type": "webex_disconnect"})).await;
    let err = next_json(&mut first).await;
    assert_eq!(err["type"], "error");

    send(&mut first, json!({"type": "ping"})).await;
    assert_eq!(next_json(&mut first).await["type"], "pong");

    drop(first);
    send(&mut second, json!({"type": "webex_connect_request"})).await;
    assert_eq!(next_json(&mut second).await["type"], "webex_connection_established");
    assert_eq!(next_json(&mut viewer).await["connected"], true);
    assert_silent(&mut viewer).await;
}

#[tokio::test]
async fn health_counts_connections() {
    let (addr, _server) = boot("http://127.0.0.1:1", 500).await;
    let _viewer = connect_viewer(addr).await;
    let _op = connect_operator(addr).await;

    let health = get_json(addr, "/health").await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["connections"], 2);
    assert_eq!(health["session_active"], false);
}
