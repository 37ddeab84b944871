//! Connected client sessions and admission control

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::types::{self, StreamMessage, StreamError};
use crate::monitoring::PipelineMetrics;

/// Outbound half of a client connection
#[async_trait]
pub trait ClientConnection: Send + Sync {
    async fn send_text(&self, text: String) -> Result<(), StreamError>;

    /// Close the connection; repeated calls are no-ops.
    async fn close(&self);
}

/// A registered client
#[derive(Clone)]
pub struct ClientSession {
    pub id: Uuid,
    pub remote: Option<SocketAddr>,
    pub connected_at: DateTime<Utc>,
    connection: Arc<dyn ClientConnection>,
}

impl ClientSession {
    pub fn new(connection: Arc<dyn ClientConnection>, remote: Option<SocketAddr>) -> Self {
        Self {
            id: Uuid::new_v4(),
            remote,
            connected_at: Utc::now(),
            connection,
        }
    }

    pub fn connection(&self) -> &Arc<dyn ClientConnection> {
        &self.connection
    }

    fn peer(&self) -> String {
        self.remote
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

/// Why a session was not registered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    AtCapacity,
    ShuttingDown,
}

impl Rejection {
    pub fn message(&self) -> &'static str {
        match self {
            Rejection::AtCapacity => types::CAPACITY_EXCEEDED_MESSAGE,
            Rejection::ShuttingDown => types::SHUTTING_DOWN_MESSAGE,
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<Uuid, ClientSession>,
    closed: bool,
}

/// Shared set of live sessions.
///
/// The capacity check and insert happen under one write lock, so the
/// registry never holds more than the capacity passed to [`try_insert`].
///
/// [`try_insert`]: ClientRegistry::try_insert
#[derive(Clone, Default)]
pub struct ClientRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session` unless the registry is full or closed. Returns the new size.
    pub fn try_insert(&self, session: ClientSession, capacity: usize) -> Result<usize, Rejection> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(Rejection::ShuttingDown);
        }
        if inner.sessions.len() >= capacity {
            return Err(Rejection::AtCapacity);
        }
        inner.sessions.insert(session.id, session);
        Ok(inner.sessions.len())
    }

    /// Remove a session; removing an unknown id is a no-op.
    pub fn remove(&self, id: Uuid) -> Option<ClientSession> {
        self.inner.write().sessions.remove(&id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.inner.read().sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().sessions.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().closed
    }

    /// Sessions registered at the time of the call
    pub fn snapshot(&self) -> Vec<ClientSession> {
        self.inner.read().sessions.values().cloned().collect()
    }

    /// Stop accepting sessions and close every registered one. Returns the number closed.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<ClientSession> = {
            let mut inner = self.inner.write();
            inner.closed = true;
            inner.sessions.drain().map(|(_, session)| session).collect()
        };

        for session in &drained {
            session.connection.close().await;
        }
        drained.len()
    }
}

/// Admits or rejects new connections against a fixed capacity
pub struct ConnectionGate {
    registry: ClientRegistry,
    max_connections: usize,
    metrics: Arc<PipelineMetrics>,
}

impl ConnectionGate {
    pub fn new(registry: ClientRegistry, max_connections: usize, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            registry,
            max_connections,
            metrics,
        }
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Register a new connection and send the acknowledgement.
    ///
    /// A rejected connection gets one `error` frame and is closed without
    /// being registered.
    pub async fn admit(
        &self,
        connection: Arc<dyn ClientConnection>,
        remote: Option<SocketAddr>,
    ) -> Option<ClientSession> {
        let session = ClientSession::new(connection, remote);

        match self.registry.try_insert(session.clone(), self.max_connections) {
            Err(rejection) => {
                warn!(
                    peer = %session.peer(),
                    max = self.max_connections,
                    "❌ Connection rejected: {:?}",
                    rejection
                );
                self.metrics.record_rejected_session();
                if let Ok(text) = StreamMessage::error(rejection.message()).to_json() {
                    let _ = session.connection.send_text(text).await;
                }
                session.connection.close().await;
                None
            }
            Ok(total) => {
                self.metrics.set_active_sessions(total);
                info!(peer = %session.peer(), sessions = total, "✅ Client connected");

                let ack = match StreamMessage::connected().to_json() {
                    Ok(text) => session.connection.send_text(text).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = ack {
                    warn!(peer = %session.peer(), "Failed to acknowledge connection: {}", e);
                    self.release(session.id).await;
                    return None;
                }
                Some(session)
            }
        }
    }

    /// Deregister and close a session. Safe to call more than once.
    pub async fn release(&self, id: Uuid) {
        if let Some(session) = self.registry.remove(id) {
            let total = self.registry.len();
            self.metrics.set_active_sessions(total);
            info!(peer = %session.peer(), sessions = total, "👋 Client disconnected");
            session.connection.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct RecordingConnection {
        sent: Mutex<Vec<String>>,
        closed: AtomicBool,
    }

    #[async_trait]
    impl ClientConnection for RecordingConnection {
        async fn send_text(&self, text: String) -> Result<(), StreamError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(StreamError::Closed);
            }
            self.sent.lock().push(text);
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn gate(capacity: usize) -> ConnectionGate {
        ConnectionGate::new(
            ClientRegistry::new(),
            capacity,
            Arc::new(PipelineMetrics::new().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_admit_sends_ack() {
        let gate = gate(2);
        let conn = Arc::new(RecordingConnection::default());
        let session = gate.admit(conn.clone(), None).await.unwrap();

        assert!(gate.registry().contains(session.id));
        let sent = conn.sent.lock();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("\"type\":\"connection_status\""));
    }

    #[tokio::test]
    async fn test_capacity_rejection() {
        let gate = gate(2);
        let first = Arc::new(RecordingConnection::default());
        let second = Arc::new(RecordingConnection::default());
        gate.admit(first.clone(), None).await.unwrap();
        gate.admit(second.clone(), None).await.unwrap();

        let third = Arc::new(RecordingConnection::default());
        assert!(gate.admit(third.clone(), None).await.is_none());

        assert_eq!(gate.registry().len(), 2);
        assert!(third.closed.load(Ordering::SeqCst));
        let sent = third.sent.lock();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains(types::CAPACITY_EXCEEDED_MESSAGE));
        assert!(!first.closed.load(Ordering::SeqCst));
        assert!(!second.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let gate = gate(1);
        let conn = Arc::new(RecordingConnection::default());
        let session = gate.admit(conn.clone(), None).await.unwrap();

        gate.release(session.id).await;
        gate.release(session.id).await;
        assert!(gate.registry().is_empty());
        assert!(conn.closed.load(Ordering::SeqCst));

        // the freed slot can be reused
        assert!(gate.admit(Arc::new(RecordingConnection::default()), None).await.is_some());
    }

    #[tokio::test]
    async fn test_close_all_stops_admission() {
        let gate = gate(4);
        let conn = Arc::new(RecordingConnection::default());
        gate.admit(conn.clone(), None).await.unwrap();

        assert_eq!(gate.registry().close_all().await, 1);
        assert!(conn.closed.load(Ordering::SeqCst));
        assert!(gate.registry().is_closed());

        let late = Arc::new(RecordingConnection::default());
        assert!(gate.admit(late.clone(), None).await.is_none());
        assert!(late.sent.lock()[0].contains(types::SHUTTING_DOWN_MESSAGE));
    }
}
