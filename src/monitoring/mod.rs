use anyhow::Result;
use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};
use tracing::info;

use crate::anomaly_detection::Method;

/// Prometheus counters for the classification pipeline.
pub struct PipelineMetrics {
    registry: Registry,

    // Pipeline metrics
    pub transactions_processed: Counter,
    pub transactions_suspicious: Counter,
    pub classifications: CounterVec,
    pub persistence_failures: Counter,

    // Session metrics
    pub broadcast_failures: Counter,
    pub active_sessions: Gauge,
    pub rejected_sessions: Counter,
}

impl PipelineMetrics {
    pub fn new() -> Result<Self> {
        info!("📊 Initializing pipeline metrics");

        let registry = Registry::new();

        let transactions_processed = Counter::new(
            "fraud_transactions_processed_total",
            "Total number of pending transactions classified",
        )?;
        let transactions_suspicious = Counter::new(
            "fraud_transactions_suspicious_total",
            "Total number of transactions classified as suspicious",
        )?;
        let classifications = CounterVec::new(
            Opts::new("fraud_classifications_total", "Classifications by method"),
            &["method"],
        )?;
        let persistence_failures = Counter::new(
            "fraud_persistence_failures_total",
            "Total number of failed persistence attempts",
        )?;

        let broadcast_failures = Counter::new(
            "fraud_broadcast_failures_total",
            "Total number of failed deliveries to client sessions",
        )?;
        let active_sessions = Gauge::new("fraud_active_sessions", "Number of connected sessions")?;
        let rejected_sessions = Counter::new(
            "fraud_rejected_sessions_total",
            "Total number of sessions rejected at capacity",
        )?;

        registry.register(Box::new(transactions_processed.clone()))?;
        registry.register(Box::new(transactions_suspicious.clone()))?;
        registry.register(Box::new(classifications.clone()))?;
        registry.register(Box::new(persistence_failures.clone()))?;
        registry.register(Box::new(broadcast_failures.clone()))?;
        registry.register(Box::new(active_sessions.clone()))?;
        registry.register(Box::new(rejected_sessions.clone()))?;

        Ok(Self {
            registry,
            transactions_processed,
            transactions_suspicious,
            classifications,
            persistence_failures,
            broadcast_failures,
            active_sessions,
            rejected_sessions,
        })
    }

    pub fn export_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn record_classification(&self, method: Method, suspicious: bool) {
        self.transactions_processed.inc();
        self.classifications.with_label_values(&[method.as_str()]).inc();
        if suspicious {
            self.transactions_suspicious.inc();
        }
    }

    pub fn record_persistence_failure(&self) {
        self.persistence_failures.inc();
    }

    pub fn record_broadcast_failures(&self, count: usize) {
        self.broadcast_failures.inc_by(count as f64);
    }

    pub fn set_active_sessions(&self, count: usize) {
        self.active_sessions.set(count as f64);
    }

    pub fn record_rejected_session(&self) {
        self.rejected_sessions.inc();
    }
}
