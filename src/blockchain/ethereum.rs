use async_trait::async_trait;
use ethers::{
    prelude::JsonRpcClient,
    providers::{FilterKind, Http, Middleware, Provider},
    types::{Transaction, H256, U256},
    utils::{format_ether, to_checksum},
};
use std::{str::FromStr, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::traits::{ChainFeed, FeedError, PendingTransaction, Result};

/// Pending transaction feed backed by `eth_newPendingTransactionFilter`.
pub struct EthereumFeed<P: JsonRpcClient = Http> {
    provider: Provider<P>,
    filter_id: Mutex<Option<U256>>,
}

impl EthereumFeed<Http> {
    pub fn new(rpc_url: &str, request_timeout: Duration) -> Result<Self> {
        let rpc_url_clean = rpc_url.trim();
        let parsed_url = reqwest::Url::parse(rpc_url_clean).map_err(|e| {
            FeedError::Rpc(format!("Invalid Ethereum RPC URL '{}': {}", rpc_url_clean, e))
        })?;

        info!("Connecting to Ethereum node: {}", parsed_url.host_str().unwrap_or("unknown"));
        let mut builder = reqwest::Client::builder().timeout(request_timeout);
        if let Ok(proxy) = std::env::var("HTTPS_PROXY").or_else(|_| std::env::var("HTTP_PROXY")) {
            if let Ok(p) = reqwest::Proxy::all(proxy) {
                builder = builder.proxy(p);
            }
        }
        let client = builder
            .build()
            .map_err(|e| FeedError::Rpc(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::new_with_provider(Provider::new(Http::new_with_client(parsed_url, client))))
    }
}

impl<P> EthereumFeed<P>
where
    P: JsonRpcClient + Send + Sync,
{
    /// Wraps an existing provider; used with `MockProvider` in tests.
    pub fn new_with_provider(provider: Provider<P>) -> Self {
        Self { provider, filter_id: Mutex::new(None) }
    }

    fn to_pending(tx: Transaction) -> Result<PendingTransaction> {
        let value_eth = format_ether(tx.value)
            .parse::<f64>()
            .map_err(|e| FeedError::Decode(format!("value {}: {}", tx.value, e)))?;
        let gas_price = match tx.gas_price {
            Some(price) => price
                .to_string()
                .parse::<f64>()
                .map_err(|e| FeedError::Decode(format!("gas price {}: {}", price, e)))?,
            None => 0.0,
        };

        Ok(PendingTransaction {
            hash: format!("{:?}", tx.hash),
            from: to_checksum(&tx.from, None),
            to: tx.to.map(|to| to_checksum(&to, None)).unwrap_or_default(),
            value_eth,
            gas_price,
        })
    }
}

#[async_trait]
impl<P> ChainFeed for EthereumFeed<P>
where
    P: JsonRpcClient + Send + Sync + 'static,
{
    async fn new_pending(&self) -> Result<Vec<String>> {
        let mut filter = self.filter_id.lock().await;
        let id = match *filter {
            Some(id) => id,
            None => {
                let id = self
                    .provider
                    .new_filter(FilterKind::PendingTransactions)
                    .await
                    .map_err(|e| FeedError::Rpc(format!("Failed to install pending filter: {}", e)))?;
                info!("Installed pending transaction filter {}", id);
                *filter = Some(id);
                id
            }
        };

        match self.provider.get_filter_changes::<_, H256>(id).await {
            Ok(hashes) => {
                debug!(count = hashes.len(), "pending filter changes");
                Ok(hashes.into_iter().map(|h| format!("{:?}", h)).collect())
            }
            Err(e) => {
                // filters expire on the node; install a fresh one next poll
                warn!("Pending filter {} poll failed, reinstalling: {}", id, e);
                *filter = None;
                Err(FeedError::Rpc(e.to_string()))
            }
        }
    }

    async fn fetch(&self, id: &str) -> Result<Option<PendingTransaction>> {
        let hash = H256::from_str(id)
            .map_err(|e| FeedError::Decode(format!("transaction hash '{}': {}", id, e)))?;

        let tx = self
            .provider
            .get_transaction(hash)
            .await
            .map_err(|e| FeedError::Rpc(e.to_string()))?;

        tx.map(Self::to_pending).transpose()
    }
}
