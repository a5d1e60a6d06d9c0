//! Local transaction signing

use crate::error::{SubmitterError, SubmitterResult};

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes};
use tracing::info;

/// Produces a signed, RLP-encoded payload for a transaction
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;

    async fn sign_transaction(&self, tx: &TypedTransaction) -> SubmitterResult<Bytes>;
}

/// Signs with an in-process private key
#[derive(Debug, Clone)]
pub struct LocalWalletSigner {
    wallet: LocalWallet,
}

impl LocalWalletSigner {
    pub fn new(wallet: LocalWallet, chain_id: u64) -> Self {
        Self {
            wallet: wallet.with_chain_id(chain_id),
        }
    }

    /// Load the wallet from the environment variable named in config
    pub fn from_env(var_name: &str, chain_id: u64) -> SubmitterResult<Self> {
        let key = std::env::var(var_name).map_err(|_| {
            SubmitterError::Config(format!("No wallet configured. Set {}", var_name))
        })?;
        let wallet = key
            .parse::<LocalWallet>()
            .map_err(|e| SubmitterError::Signing(format!("Invalid private key: {}", e)))?;

        info!("Local signer initialized with wallet: {:?}", wallet.address());
        Ok(Self::new(wallet, chain_id))
    }
}

#[async_trait]
impl TransactionSigner for LocalWalletSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign_transaction(&self, tx: &TypedTransaction) -> SubmitterResult<Bytes> {
        let signature = self
            .wallet
            .sign_transaction(tx)
            .await
            .map_err(|e| SubmitterError::Signing(e.to_string()))?;
        Ok(tx.rlp_signed(&signature))
    }
}
