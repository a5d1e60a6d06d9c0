//! Chain module - the provider and signer seams the submitter drives
//!
//! This module provides:
//! - The [`ChainClient`] trait the resubmitter sends and waits through
//! - An ethers-backed implementation with multi-RPC failover
//! - The [`TransactionSigner`] trait for local signing
//!
//! Nonce contract: implementations must not reassign nonces on their own.
//! The submitter pins one nonce per logical submission so that escalated
//! attempts replace each other instead of spending twice.

pub mod provider;
pub mod signer;

pub use provider::EthersChainClient;
pub use signer::{LocalWalletSigner, TransactionSigner};

use crate::error::SubmitterResult;

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionReceipt, TxHash, U256};

/// Network operations the submitter depends on
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current network gas price in wei
    async fn gas_price(&self) -> SubmitterResult<U256>;

    /// Next nonce for `address`, counting pending transactions
    async fn pending_nonce(&self, address: Address) -> SubmitterResult<U256>;

    /// Gas limit estimate for a transaction
    async fn estimate_gas(&self, tx: &TypedTransaction) -> SubmitterResult<U256>;

    /// Broadcast a signed payload, returning its hash once the node accepts it
    async fn send_raw_transaction(&self, raw: Bytes) -> SubmitterResult<TxHash>;

    /// Wait until `hash` has `confirmations` blocks on top of it.
    ///
    /// Resolves to `None` if the node drops the transaction from its pool.
    async fn wait_for_transaction(
        &self,
        hash: TxHash,
        confirmations: usize,
    ) -> SubmitterResult<Option<TransactionReceipt>>;
}
