//! Fan-out of classified transactions to every live session

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::registry::ClientRegistry;
use super::types::{StreamError, StreamMessage};
use crate::core::ClassifiedTransaction;
use crate::monitoring::PipelineMetrics;

/// Outcome of one publish pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub pruned: Vec<Uuid>,
}

pub struct BroadcastHub {
    registry: ClientRegistry,
    send_timeout: Duration,
    metrics: Arc<PipelineMetrics>,
}

impl BroadcastHub {
    pub fn new(registry: ClientRegistry, send_timeout: Duration, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            registry,
            send_timeout,
            metrics,
        }
    }

    /// Deliver `tx` to every registered session.
    ///
    /// Sessions whose delivery fails or times out are removed after the pass.
    pub async fn publish(&self, tx: &ClassifiedTransaction) -> BroadcastReport {
        let sessions = self.registry.snapshot();
        if sessions.is_empty() {
            return BroadcastReport::default();
        }

        let text = match StreamMessage::transaction(tx).to_json() {
            Ok(text) => text,
            Err(e) => {
                error!(hash = %tx.hash, "Failed to serialize broadcast: {}", e);
                return BroadcastReport::default();
            }
        };

        let deliveries = sessions.iter().map(|session| {
            let text = text.clone();
            async move {
                let result = match tokio::time::timeout(
                    self.send_timeout,
                    session.connection().send_text(text),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(StreamError::Timeout),
                };
                (session, result)
            }
        });

        let mut report = BroadcastReport::default();
        for (session, result) in join_all(deliveries).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    debug!(session = %session.id, "delivery failed: {}", e);
                    report.pruned.push(session.id);
                }
            }
        }

        if !report.pruned.is_empty() {
            for id in &report.pruned {
                if let Some(session) = self.registry.remove(*id) {
                    session.connection().close().await;
                }
            }
            let remaining = self.registry.len();
            warn!(
                pruned = report.pruned.len(),
                sessions = remaining,
                "Removed sessions after failed delivery"
            );
            self.metrics.record_broadcast_failures(report.pruned.len());
            self.metrics.set_active_sessions(remaining);
        }

        report
    }
}
