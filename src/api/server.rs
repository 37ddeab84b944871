use axum::{routing::get, Router};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::api::handlers::{health_check, metrics};
use crate::api::registry::ConnectionGate;
use crate::api::server_config::{BIND_RETRY_DELAY, MAX_BODY_SIZE};
use crate::api::stream::websocket_handler;
use crate::config::ServerConfig;
use crate::core::errors::ServiceError;
use crate::monitoring::PipelineMetrics;
use crate::service::monitor::MonitorStats;

/// Shared state of the streaming endpoint
#[derive(Clone)]
pub struct StreamServer {
    pub config: ServerConfig,
    pub gate: Arc<ConnectionGate>,
    pub metrics: Arc<PipelineMetrics>,
    pub stats: Arc<MonitorStats>,
    pub classifier_mode: &'static str,
    pub shutdown: CancellationToken,
}

impl StreamServer {
    pub fn new(
        config: ServerConfig,
        gate: Arc<ConnectionGate>,
        metrics: Arc<PipelineMetrics>,
        stats: Arc<MonitorStats>,
        classifier_mode: &'static str,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            gate,
            metrics,
            stats,
            classifier_mode,
            shutdown,
        }
    }

    pub fn create_router(self) -> Router {
        Router::new()
            .route("/", get(websocket_handler))
            .route("/ws", get(websocket_handler))
            .route("/health", get(health_check))
            .route("/metrics", get(metrics))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE)),
            )
            .with_state(self)
    }

    /// Bind the listener, retrying once after [`BIND_RETRY_DELAY`] if the port is in use.
    pub async fn bind(&self) -> Result<TcpListener, ServiceError> {
        let addr = self.config.bind_addr();
        let bind_error = |e: std::io::Error| ServiceError::ListenerBind {
            addr: addr.clone(),
            reason: e.to_string(),
        };

        match TcpListener::bind(&addr).await {
            Ok(listener) => Ok(listener),
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                warn!(
                    "⚠️ Port {} in use, retrying in {}s",
                    self.config.port,
                    BIND_RETRY_DELAY.as_secs()
                );
                tokio::time::sleep(BIND_RETRY_DELAY).await;
                TcpListener::bind(&addr).await.map_err(bind_error)
            }
            Err(e) => Err(bind_error(e)),
        }
    }

    /// Serve until the shutdown token is cancelled.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServiceError> {
        let local = listener
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| self.config.bind_addr());
        info!("🚀 Streaming server listening on ws://{}", local);

        let shutdown = self.shutdown.clone();
        let app = self.create_router();
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| ServiceError::Server(e.to_string()))?;

        info!("Streaming server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::registry::ClientRegistry;

    fn server(config: ServerConfig) -> StreamServer {
        let metrics = Arc::new(PipelineMetrics::new().unwrap());
        let gate = Arc::new(ConnectionGate::new(
            ClientRegistry::new(),
            config.max_connections,
            metrics.clone(),
        ));
        StreamServer::new(
            config,
            gate,
            metrics,
            Arc::new(MonitorStats::default()),
            "rule_based",
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_bind_fails_when_port_stays_in_use() {
        let holder = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = holder.local_addr().unwrap().port();

        let config = ServerConfig {
            port,
            ..Default::default()
        };
        let err = server(config).bind().await.unwrap_err();
        assert!(matches!(err, ServiceError::ListenerBind { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_bind_free_port() {
        let config = ServerConfig {
            port: 0,
            ..Default::default()
        };
        assert!(server(config).bind().await.is_ok());
    }
}
