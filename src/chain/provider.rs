//! Chain provider with multi-RPC support and automatic failover

use super::ChainClient;
use crate::config::ChainConfig;
use crate::error::{SubmitterError, SubmitterResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Multi-provider wrapper with automatic failover
pub struct EthersChainClient {
    /// Chain configuration
    config: ChainConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl EthersChainClient {
    /// Create a new chain client from the configured RPC URLs
    pub fn new(config: ChainConfig) -> SubmitterResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(config.poll_interval_ms));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(SubmitterError::Config(format!(
                "No valid RPC providers for chain {}",
                config.chain_id
            )));
        }

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.config.chain_id, next);
    }

    /// Get chain ID
    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    fn transport_error(&self, context: &str, e: impl std::fmt::Display) -> SubmitterError {
        SubmitterError::Transport(format!(
            "{} on chain {}: {}",
            context, self.config.chain_id, e
        ))
    }
}

#[async_trait]
impl ChainClient for EthersChainClient {
    async fn gas_price(&self) -> SubmitterResult<U256> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_gas_price().await {
                Ok(price) => return Ok(price),
                Err(e) => {
                    warn!(
                        "Failed to get gas price from chain {}: {}",
                        self.config.chain_id, e
                    );
                    self.failover();
                }
            }
        }

        Err(self.transport_error("gas price", "all providers failed"))
    }

    async fn pending_nonce(&self, address: Address) -> SubmitterResult<U256> {
        self.http()
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| SubmitterError::Nonce {
                address: format!("{:?}", address),
                message: e.to_string(),
            })
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> SubmitterResult<U256> {
        self.http()
            .estimate_gas(tx, None)
            .await
            .map_err(|e| SubmitterError::GasEstimation(e.to_string()))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> SubmitterResult<TxHash> {
        // No failover here: a second node may already have the payload and
        // answer "already known", which would read as a failure.
        let pending = self
            .http()
            .send_raw_transaction(raw)
            .await
            .map_err(|e| self.transport_error("send", e))?;
        Ok(pending.tx_hash())
    }

    async fn wait_for_transaction(
        &self,
        hash: TxHash,
        confirmations: usize,
    ) -> SubmitterResult<Option<TransactionReceipt>> {
        PendingTransaction::new(hash, self.http())
            .confirmations(confirmations)
            .await
            .map_err(|e| self.transport_error("confirmation wait", e))
    }
}
