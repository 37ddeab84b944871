//! Process wiring and shutdown sequencing

pub mod monitor;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::anomaly_detection::{Classifier, FeatureComputer};
use crate::api::{BroadcastHub, ClientRegistry, ConnectionGate, StreamServer};
use crate::blockchain::{ChainFeed, EthereumFeed};
use crate::config::ServiceConfig;
use crate::core::errors::ServiceError;
use crate::monitoring::PipelineMetrics;
use crate::storage::TransactionStore;

pub use monitor::{MonitorLoop, MonitorState, MonitorStats};

/// A fully wired fraud stream service
pub struct FraudStreamService {
    config: ServiceConfig,
    store: TransactionStore,
    registry: ClientRegistry,
    monitor: Arc<MonitorLoop>,
    server: StreamServer,
    shutdown: CancellationToken,
}

impl FraudStreamService {
    /// Build the service against the configured Ethereum node.
    pub async fn build(config: ServiceConfig) -> Result<Self, ServiceError> {
        let feed = EthereumFeed::new(&config.feed.rpc_url, config.feed.request_timeout())?;
        Self::build_with_feed(config, Arc::new(feed)).await
    }

    /// Build the service around any chain feed.
    pub async fn build_with_feed(
        config: ServiceConfig,
        feed: Arc<dyn ChainFeed>,
    ) -> Result<Self, ServiceError> {
        config.validate().map_err(ServiceError::Config)?;

        let store = TransactionStore::new_with_url(&config.storage.database_url).await?;
        let classifier = Classifier::from_config(&config.detection);
        let features = FeatureComputer::new(Arc::new(store.clone()), config.detection.lookback_hours);
        let metrics = Arc::new(PipelineMetrics::new().map_err(|e| ServiceError::Config(e.to_string()))?);

        let registry = ClientRegistry::new();
        let gate = Arc::new(ConnectionGate::new(
            registry.clone(),
            config.server.max_connections,
            metrics.clone(),
        ));
        let hub = Arc::new(BroadcastHub::new(
            registry.clone(),
            config.server.heartbeat_timeout(),
            metrics.clone(),
        ));

        let stats = Arc::new(MonitorStats::default());
        let shutdown = CancellationToken::new();
        let server = StreamServer::new(
            config.server.clone(),
            gate,
            metrics.clone(),
            stats.clone(),
            classifier.mode(),
            shutdown.clone(),
        );

        let monitor = Arc::new(
            MonitorLoop::new(
                feed,
                features,
                classifier,
                store.clone(),
                hub,
                registry.clone(),
                stats,
                metrics,
            )
            .with_poll_interval(config.feed.poll_interval())
            .with_stats_every(config.monitor.stats_every),
        );

        Ok(Self {
            config,
            store,
            registry,
            monitor,
            server,
            shutdown,
        })
    }

    /// Token that stops the service when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub fn monitor(&self) -> &Arc<MonitorLoop> {
        &self.monitor
    }

    pub fn store(&self) -> &TransactionStore {
        &self.store
    }

    /// Bind, serve and monitor until the shutdown token is cancelled.
    ///
    /// Fails without serving if the port cannot be bound.
    pub async fn run(self) -> Result<(), ServiceError> {
        let listener = self.server.bind().await?;
        info!(
            host = %self.config.server.host,
            port = self.config.server.port,
            max_connections = self.config.server.max_connections,
            classifier = self.server.classifier_mode,
            "🛡️ Fraud detection stream starting"
        );

        let mut server_task = tokio::spawn(self.server.clone().serve(listener));

        let monitor = self.monitor.clone();
        let monitor_token = self.shutdown.clone();
        let monitor_task = tokio::spawn(async move { monitor.run(monitor_token).await });

        let finished_early = tokio::select! {
            _ = self.shutdown.cancelled() => None,
            result = &mut server_task => Some(result),
        };

        info!("🛑 Shutting down");
        self.shutdown.cancel();

        let closed = self.registry.close_all().await;
        info!(closed, "Closed client sessions");

        if let Err(e) = monitor_task.await {
            error!("Monitor task failed: {}", e);
        }

        let server_result = match finished_early {
            Some(result) => result,
            None => server_task.await,
        };
        self.store.close().await;

        match server_result {
            Ok(result) => result,
            Err(e) => Err(ServiceError::Server(e.to_string())),
        }
    }
}
