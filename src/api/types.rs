//! Streaming wire messages
//!
//! Every frame is a JSON object tagged by `type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::anomaly_detection::{FeatureVector, Label, Method};
use crate::core::ClassifiedTransaction;

pub const CAPACITY_EXCEEDED_MESSAGE: &str = "Server at maximum capacity. Please try again later.";
pub const SHUTTING_DOWN_MESSAGE: &str = "Server is shutting down.";
pub const CONNECTED_MESSAGE: &str = "Connected to fraud detection server";

/// Per-session delivery errors
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("connection closed")]
    Closed,
    #[error("send failed: {0}")]
    Send(String),
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("send timed out")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, StreamError>;

/// Broadcast payload for one classified transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionPayload {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value_eth: f64,
    pub gas_price: f64,
    pub classification: Label,
    pub method: Method,
    pub timestamp: DateTime<Utc>,
    pub features: FeatureVector,
}

impl From<&ClassifiedTransaction> for TransactionPayload {
    fn from(tx: &ClassifiedTransaction) -> Self {
        Self {
            hash: tx.hash.clone(),
            from: tx.from.clone(),
            to: tx.to.clone(),
            value_eth: tx.value_eth,
            gas_price: tx.gas_price,
            classification: tx.classification.label,
            method: tx.classification.method,
            timestamp: tx.timestamp,
            features: tx.features,
        }
    }
}

/// Server to client messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    ConnectionStatus {
        status: String,
        message: String,
        server_time: DateTime<Utc>,
    },
    Error {
        message: String,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    MessageReceived {
        status: String,
    },
    Transaction {
        data: TransactionPayload,
    },
}

impl StreamMessage {
    pub fn connected() -> Self {
        Self::ConnectionStatus {
            status: "connected".to_string(),
            message: CONNECTED_MESSAGE.to_string(),
            server_time: Utc::now(),
        }
    }

    pub fn error(message: &str) -> Self {
        Self::Error { message: message.to_string() }
    }

    pub fn transaction(tx: &ClassifiedTransaction) -> Self {
        Self::Transaction { data: tx.into() }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Reply to an inbound text frame: `ping` gets a pong, anything else an ack.
    ///
    /// Invalid JSON is logged and left unanswered.
    pub fn reply_to(text: &str) -> Option<Self> {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!("Invalid JSON from client: {}", e);
                return None;
            }
        };

        match value.get("type").and_then(|t| t.as_str()) {
            Some("ping") => Some(Self::Pong { timestamp: Utc::now() }),
            _ => Some(Self::MessageReceived { status: "ok".to_string() }),
        }
    }
}
