//! Pending transaction monitor
//!
//! The single driver of the pipeline: poll the chain feed, then for each new
//! transaction compute features, classify, persist and broadcast.

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::anomaly_detection::{Classifier, FeatureComputer};
use crate::api::{BroadcastHub, ClientRegistry};
use crate::blockchain::{ChainFeed, FeedError};
use crate::core::ClassifiedTransaction;
use crate::monitoring::PipelineMetrics;
use crate::storage::{RecordOutcome, TransactionStore};

/// Running counters, shared with the health endpoint
#[derive(Debug, Default)]
pub struct MonitorStats {
    processed: AtomicU64,
    suspicious: AtomicU64,
}

impl MonitorStats {
    /// Count one processed transaction; returns the new processed total.
    pub fn record(&self, suspicious: bool) -> u64 {
        if suspicious {
            self.suspicious.fetch_add(1, Ordering::Relaxed);
        }
        self.processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn suspicious(&self) -> u64 {
        self.suspicious.load(Ordering::Relaxed)
    }

    /// Percentage of processed transactions labelled suspicious
    pub fn suspicious_rate(&self) -> f64 {
        let processed = self.processed();
        if processed == 0 {
            return 0.0;
        }
        self.suspicious() as f64 / processed as f64 * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Running,
    Stopping,
}

pub struct MonitorLoop {
    feed: Arc<dyn ChainFeed>,
    features: FeatureComputer,
    classifier: Classifier,
    store: TransactionStore,
    hub: Arc<BroadcastHub>,
    registry: ClientRegistry,
    stats: Arc<MonitorStats>,
    metrics: Arc<PipelineMetrics>,
    poll_interval: Duration,
    stats_every: u64,
    state: RwLock<MonitorState>,
}

impl MonitorLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        feed: Arc<dyn ChainFeed>,
        features: FeatureComputer,
        classifier: Classifier,
        store: TransactionStore,
        hub: Arc<BroadcastHub>,
        registry: ClientRegistry,
        stats: Arc<MonitorStats>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            feed,
            features,
            classifier,
            store,
            hub,
            registry,
            stats,
            metrics,
            poll_interval: Duration::from_millis(100),
            stats_every: 100,
            state: RwLock::new(MonitorState::Running),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_stats_every(mut self, stats_every: u64) -> Self {
        self.stats_every = stats_every.max(1);
        self
    }

    pub fn state(&self) -> MonitorState {
        *self.state.read()
    }

    pub fn stats(&self) -> &Arc<MonitorStats> {
        &self.stats
    }

    /// Poll until `shutdown` is cancelled.
    ///
    /// Cancellation is observed between transactions and between cycles;
    /// the transaction being processed always completes.
    pub async fn run(&self, shutdown: CancellationToken) {
        *self.state.write() = MonitorState::Running;
        info!(
            classifier = self.classifier.mode(),
            poll_ms = self.poll_interval.as_millis() as u64,
            "🔍 Monitoring pending transactions"
        );

        while !shutdown.is_cancelled() {
            self.run_cycle(&shutdown).await;

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        *self.state.write() = MonitorState::Stopping;
        info!(
            processed = self.stats.processed(),
            suspicious = self.stats.suspicious(),
            "Monitor loop stopped"
        );
    }

    /// One feed poll. Returns the number of transactions fully processed.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> usize {
        let ids = match self.feed.new_pending().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Failed to poll pending transactions: {}", e);
                return 0;
            }
        };

        let mut handled = 0;
        for (index, id) in ids.iter().enumerate() {
            if shutdown.is_cancelled() {
                info!(abandoned = ids.len() - index, "Shutdown requested, abandoning remaining pending transactions");
                break;
            }

            match self.process(id).await {
                Ok(Some(_)) => handled += 1,
                Ok(None) => debug!(hash = %id, "transaction no longer available"),
                Err(e) => warn!(hash = %id, "Error processing transaction: {}", e),
            }
        }
        handled
    }

    /// Fetch, classify, persist and broadcast one transaction.
    pub async fn process(&self, id: &str) -> Result<Option<ClassifiedTransaction>, FeedError> {
        let Some(pending) = self.feed.fetch(id).await? else {
            return Ok(None);
        };

        let observed_at = Utc::now();
        let features = self
            .features
            .compute_for_transaction(&pending.from, &pending.to)
            .await;
        let classification = self.classifier.classify(&features);
        let tx = ClassifiedTransaction::new(pending, observed_at, features, classification);

        let icon = if tx.is_suspicious() { "🚨" } else { "✅" };
        info!(
            label = %tx.classification.label,
            method = %tx.classification.method,
            value_eth = tx.value_eth,
            "{} {}... classified",
            icon,
            tx.short_hash()
        );

        match self.store.record(&tx).await {
            RecordOutcome::Inserted => debug!(hash = %tx.hash, "persisted"),
            RecordOutcome::AlreadyPresent => debug!(hash = %tx.hash, "already persisted"),
            RecordOutcome::Failed(reason) => {
                self.metrics.record_persistence_failure();
                warn!(hash = %tx.hash, "Persistence failed, broadcasting anyway: {}", reason);
            }
        }

        self.hub.publish(&tx).await;

        self.metrics
            .record_classification(tx.classification.method, tx.is_suspicious());
        let processed = self.stats.record(tx.is_suspicious());
        if processed % self.stats_every == 0 {
            info!(
                "📊 Stats: {} transactions processed, {} suspicious ({:.2}%), {} connected clients",
                processed,
                self.stats.suspicious(),
                self.stats.suspicious_rate(),
                self.registry.len()
            );
        }

        Ok(Some(tx))
    }
}
