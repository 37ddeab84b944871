use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chain feed errors. Callers log these and retry on the next poll.
#[derive(Debug, Error)]
pub enum FeedError {
    /// JSON-RPC transport or node error
    #[error("RPC error: {0}")]
    Rpc(String),
    /// A node response or identifier could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, FeedError>;

/// Details of a transaction observed in the mempool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub hash: String,
    pub from: String,
    /// Empty for contract creations
    pub to: String,
    pub value_eth: f64,
    /// Gas price in wei
    pub gas_price: f64,
}

/// Source of newly observed pending transactions.
#[async_trait]
pub trait ChainFeed: Send + Sync {
    /// Identifiers observed since the previous call.
    async fn new_pending(&self) -> Result<Vec<String>>;

    /// Full details for an identifier; `None` if the node no longer knows it.
    async fn fetch(&self, id: &str) -> Result<Option<PendingTransaction>>;
}
