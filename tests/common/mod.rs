// tests/common/mod.rs
// Shared fakes for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eth_fraud_stream::anomaly_detection::{ClassificationResult, FeatureVector, Label, Method};
use eth_fraud_stream::api::{ClientConnection, StreamError};
use eth_fraud_stream::blockchain::{ChainFeed, FeedError, PendingTransaction};
use eth_fraud_stream::core::ClassifiedTransaction;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

/// Connection that records every frame it is sent
#[derive(Default)]
pub struct RecordingConnection {
    pub sent: Mutex<Vec<String>>,
    pub closed: AtomicBool,
}

impl RecordingConnection {
    pub fn frames(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientConnection for RecordingConnection {
    async fn send_text(&self, text: String) -> Result<(), StreamError> {
        if self.is_closed() {
            return Err(StreamError::Closed);
        }
        self.sent.lock().push(text);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connection whose peer has gone away
#[derive(Default)]
pub struct BrokenConnection {
    pub closed: AtomicBool,
}

#[async_trait]
impl ClientConnection for BrokenConnection {
    async fn send_text(&self, _text: String) -> Result<(), StreamError> {
        Err(StreamError::Send("connection reset by peer".to_string()))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Chain feed that replays queued identifier batches
#[derive(Default)]
pub struct ScriptedFeed {
    batches: Mutex<VecDeque<Vec<String>>>,
    transactions: Mutex<HashMap<String, PendingTransaction>>,
}

impl ScriptedFeed {
    pub fn push_batch(&self, ids: &[&str]) {
        self.batches
            .lock()
            .push_back(ids.iter().map(|id| id.to_string()).collect());
    }

    pub fn insert(&self, tx: PendingTransaction) {
        self.transactions.lock().insert(tx.hash.clone(), tx);
    }
}

#[async_trait]
impl ChainFeed for ScriptedFeed {
    async fn new_pending(&self) -> Result<Vec<String>, FeedError> {
        Ok(self.batches.lock().pop_front().unwrap_or_default())
    }

    async fn fetch(&self, id: &str) -> Result<Option<PendingTransaction>, FeedError> {
        if id.starts_with("0xbad") {
            return Err(FeedError::Rpc("node unavailable".to_string()));
        }
        Ok(self.transactions.lock().get(id).cloned())
    }
}

pub fn pending(hash: &str, from: &str, to: &str, value_eth: f64) -> PendingTransaction {
    PendingTransaction {
        hash: hash.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        value_eth,
        gas_price: 20e9,
    }
}

/// A ledger row for seeding wallet history
pub fn history_row(
    hash: &str,
    from: &str,
    to: &str,
    value_eth: f64,
    at: DateTime<Utc>,
) -> ClassifiedTransaction {
    ClassifiedTransaction::new(
        pending(hash, from, to, value_eth),
        at,
        FeatureVector::safe_default(at),
        ClassificationResult {
            label: Label::Legitimate,
            method: Method::RuleFull,
            probability: None,
        },
    )
}
