//! Per-session WebSocket handling
//!
//! Admission, acknowledgement, inbound replies and heartbeat for one client.
//! Broadcasts are written by [`BroadcastHub`](super::broadcast::BroadcastHub)
//! through the shared sink.

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::registry::ClientConnection;
use super::server::StreamServer;
use super::types::{StreamError, StreamMessage};

/// Outbound half of an upgraded socket
pub struct WsConnection {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    closed: AtomicBool,
}

impl WsConnection {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
        }
    }

    async fn send_frame(&self, frame: Message) -> Result<(), StreamError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StreamError::Closed);
        }
        self.sink
            .lock()
            .await
            .send(frame)
            .await
            .map_err(|e| StreamError::Send(e.to_string()))
    }

    pub async fn send_ping(&self) -> Result<(), StreamError> {
        self.send_frame(Message::Ping(Vec::new())).await
    }
}

#[async_trait]
impl ClientConnection for WsConnection {
    async fn send_text(&self, text: String) -> Result<(), StreamError> {
        self.send_frame(Message::Text(text)).await
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    }
}

/// GET / and GET /ws
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    State(server): State<StreamServer>,
) -> Response {
    let remote = connect_info.map(|ConnectInfo(addr)| addr);
    debug!(?remote, "WebSocket upgrade request");

    ws.max_message_size(server.config.max_message_size)
        .on_upgrade(move |socket| handle_session(socket, remote, server))
}

async fn send_bounded(
    connection: &WsConnection,
    message: &StreamMessage,
    limit: Duration,
) -> Result<(), StreamError> {
    let text = message.to_json()?;
    match tokio::time::timeout(limit, connection.send_text(text)).await {
        Ok(result) => result,
        Err(_) => Err(StreamError::Timeout),
    }
}

async fn handle_session(socket: WebSocket, remote: Option<SocketAddr>, server: StreamServer) {
    let (sink, mut inbound) = socket.split();
    let connection = Arc::new(WsConnection::new(sink));

    let Some(session) = server.gate.admit(connection.clone(), remote).await else {
        return;
    };

    let interval = server.config.heartbeat_interval();
    let timeout = server.config.heartbeat_timeout();
    let shutdown = server.shutdown.clone();

    let mut heartbeat = tokio::time::interval_at(Instant::now() + interval, interval);
    let mut pong_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            _ = heartbeat.tick() => {
                let sent = match tokio::time::timeout(timeout, connection.send_ping()).await {
                    Ok(result) => result,
                    Err(_) => Err(StreamError::Timeout),
                };
                if let Err(e) = sent {
                    debug!(session = %session.id, "ping failed: {}", e);
                    break;
                }
                if pong_deadline.is_none() {
                    pong_deadline = Some(Instant::now() + timeout);
                }
            }

            _ = tokio::time::sleep_until(pong_deadline.unwrap_or_else(Instant::now)), if pong_deadline.is_some() => {
                warn!(session = %session.id, "Heartbeat timed out");
                break;
            }

            frame = inbound.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    pong_deadline = None;
                    if let Some(reply) = StreamMessage::reply_to(&text) {
                        if let Err(e) = send_bounded(&connection, &reply, timeout).await {
                            debug!(session = %session.id, "reply failed: {}", e);
                            break;
                        }
                    }
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Ping(_))) | Some(Ok(Message::Binary(_))) => {
                    pong_deadline = None;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(session = %session.id, "receive error: {}", e);
                    break;
                }
            },
        }
    }

    server.gate.release(session.id).await;
    connection.close().await;
    debug!(session = %session.id, "session ended");
}
