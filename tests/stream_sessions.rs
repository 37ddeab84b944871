//! WebSocket session admission, replies and the auxiliary HTTP routes

use axum::http::StatusCode;
use axum_test::{TestServer, TestServerConfig, Transport, WsMessage};
use eth_fraud_stream::api::{ClientRegistry, ConnectionGate, StreamServer};
use eth_fraud_stream::config::ServerConfig;
use eth_fraud_stream::monitoring::PipelineMetrics;
use eth_fraud_stream::service::MonitorStats;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct TestStream {
    server: TestServer,
    registry: ClientRegistry,
    stats: Arc<MonitorStats>,
    shutdown: CancellationToken,
}

fn setup(max_connections: usize) -> TestStream {
    setup_with(ServerConfig {
        port: 0,
        max_connections,
        ..Default::default()
    })
}

fn setup_with(config: ServerConfig) -> TestStream {
    let max_connections = config.max_connections;
    let metrics = Arc::new(PipelineMetrics::new().unwrap());
    let registry = ClientRegistry::new();
    let gate = Arc::new(ConnectionGate::new(registry.clone(), max_connections, metrics.clone()));
    let stats = Arc::new(MonitorStats::default());
    let shutdown = CancellationToken::new();

    let stream = StreamServer::new(config, gate, metrics, stats.clone(), "rule_based", shutdown.clone());
    // upgrades need a real socket
    let cfg = TestServerConfig {
        transport: Some(Transport::HttpRandomPort),
        ..TestServerConfig::default()
    };
    let server = TestServer::new_with_config(stream.create_router(), cfg).unwrap();

    TestStream {
        server,
        registry,
        stats,
        shutdown,
    }
}

async fn wait_for_sessions(registry: &ClientRegistry, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while registry.len() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_connect_acknowledged() {
    let t = setup(4);
    let mut ws = t.server.get_websocket("/ws").await.into_websocket().await;

    let ack: Value = ws.receive_json().await;
    assert_eq!(ack["type"], "connection_status");
    assert_eq!(ack["status"], "connected");
    assert_eq!(ack["message"], "Connected to fraud detection server");
    assert!(ack["server_time"].is_string());
    assert_eq!(t.registry.len(), 1);
}

#[tokio::test]
async fn test_root_path_also_streams() {
    let t = setup(4);
    let mut ws = t.server.get_websocket("/").await.into_websocket().await;
    let ack: Value = ws.receive_json().await;
    assert_eq!(ack["type"], "connection_status");
}

#[tokio::test]
async fn test_capacity_rejects_extra_connection() {
    let t = setup(2);

    let mut first = t.server.get_websocket("/ws").await.into_websocket().await;
    let mut second = t.server.get_websocket("/ws").await.into_websocket().await;
    let _: Value = first.receive_json().await;
    let _: Value = second.receive_json().await;
    assert_eq!(t.registry.len(), 2);

    let mut extra = t.server.get_websocket("/ws").await.into_websocket().await;
    let rejection: Value = extra.receive_json().await;
    assert_eq!(
        rejection,
        json!({
            "type": "error",
            "message": "Server at maximum capacity. Please try again later."
        })
    );
    assert!(matches!(extra.receive_message().await, WsMessage::Close(_)));
    assert_eq!(t.registry.len(), 2);

    // admitted sessions keep working
    first.send_json(&json!({ "type": "ping" })).await;
    let pong: Value = first.receive_json().await;
    assert_eq!(pong["type"], "pong");
    assert_eq!(t.registry.len(), 2);
}

#[tokio::test]
async fn test_inbound_replies() {
    let t = setup(4);
    let mut ws = t.server.get_websocket("/ws").await.into_websocket().await;
    let _: Value = ws.receive_json().await;

    ws.send_json(&json!({ "type": "ping" })).await;
    let pong: Value = ws.receive_json().await;
    assert_eq!(pong["type"], "pong");
    assert!(pong["timestamp"].is_string());

    ws.send_json(&json!({ "type": "subscribe", "topic": "all" })).await;
    let ack: Value = ws.receive_json().await;
    assert_eq!(ack, json!({ "type": "message_received", "status": "ok" }));

    // invalid JSON is ignored; the session stays open
    ws.send_text("not json").await;
    ws.send_json(&json!({ "type": "ping" })).await;
    let pong: Value = ws.receive_json().await;
    assert_eq!(pong["type"], "pong");
}

#[tokio::test]
async fn test_closed_session_deregistered() {
    let t = setup(1);
    let mut ws = t.server.get_websocket("/ws").await.into_websocket().await;
    let _: Value = ws.receive_json().await;
    assert_eq!(t.registry.len(), 1);

    ws.close().await;
    wait_for_sessions(&t.registry, 0).await;

    // the freed slot can be reused
    let mut again = t.server.get_websocket("/ws").await.into_websocket().await;
    let ack: Value = again.receive_json().await;
    assert_eq!(ack["type"], "connection_status");
}

#[tokio::test]
async fn test_unanswered_heartbeat_deregisters() {
    let t = setup_with(ServerConfig {
        port: 0,
        max_connections: 4,
        heartbeat_interval_secs: 1,
        heartbeat_timeout_secs: 1,
        ..Default::default()
    });

    // never read again, so server pings go unanswered
    let _silent = t.server.get_websocket("/ws").await.into_websocket().await;
    wait_for_sessions(&t.registry, 1).await;

    wait_for_sessions(&t.registry, 0).await;
}

#[tokio::test]
async fn test_shutdown_ends_sessions() {
    let t = setup(4);
    let mut ws = t.server.get_websocket("/ws").await.into_websocket().await;
    let _: Value = ws.receive_json().await;

    t.shutdown.cancel();
    wait_for_sessions(&t.registry, 0).await;
}

#[tokio::test]
async fn test_health_route() {
    let t = setup(7);
    t.stats.record(true);
    t.stats.record(false);

    let response = t.server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["max_connections"], 7);
    assert_eq!(body["sessions"], 0);
    assert_eq!(body["processed"], 2);
    assert_eq!(body["suspicious"], 1);
    assert_eq!(body["classifier"], "rule_based");
}

#[tokio::test]
async fn test_metrics_route() {
    let t = setup(4);
    let response = t.server.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().contains("fraud_transactions_processed_total"));
}
