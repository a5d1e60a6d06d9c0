//! Transaction submitter facade
//!
//! Fills in what the resubmitter needs (nonce, gas limit, starting gas price)
//! and picks the submission mode: local signing re-signs every round, an
//! external signer is asked once and the signed payload is then broadcast and
//! awaited.

use super::hooks::{self, SubmissionHooks};
use super::nonce::NonceManager;
use super::resubmit::{Resubmitter, Submission};
use super::types::UnsignedTransaction;
use crate::chain::{ChainClient, TransactionSigner};
use crate::config::ResubmissionConfig;
use crate::error::{SubmitterError, SubmitterResult};
use crate::shutdown::Shutdown;

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionReceipt, U256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Signer living outside this process that signs a transaction once
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExternalSigner: Send + Sync {
    /// Address the signer will sign for
    async fn address(&self) -> SubmitterResult<Address>;

    /// Signed, RLP-encoded payload for `tx`
    async fn sign_transaction(&self, tx: &TypedTransaction) -> SubmitterResult<Bytes>;
}

/// Submits transactions and escalates gas until they are mined
pub struct TransactionSubmitter {
    client: Arc<dyn ChainClient>,
    /// Needed for local signing only
    signer: Option<Arc<dyn TransactionSigner>>,
    nonces: Arc<NonceManager>,
    resubmitter: Resubmitter,
    chain_id: u64,
}

impl TransactionSubmitter {
    /// Create a submitter waiting for `confirmations` blocks on every receipt
    pub fn new(
        client: Arc<dyn ChainClient>,
        config: ResubmissionConfig,
        confirmations: usize,
        chain_id: u64,
    ) -> SubmitterResult<Self> {
        config
            .validate()
            .map_err(|e| SubmitterError::Config(e.to_string()))?;
        let resubmitter = Resubmitter::new(client.clone(), config, confirmations, chain_id)?;

        info!("Transaction submitter initialized for chain {}", chain_id);

        Ok(Self {
            nonces: Arc::new(NonceManager::new(client.clone())),
            client,
            signer: None,
            resubmitter,
            chain_id,
        })
    }

    /// Enable [`submit_transaction`](Self::submit_transaction) with a local
    /// signer
    pub fn with_signer(mut self, signer: Arc<dyn TransactionSigner>) -> Self {
        info!("Local signing enabled with wallet: {:?}", signer.address());
        self.signer = Some(signer);
        self
    }

    /// Cancel in-flight submissions when `shutdown` fires
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.resubmitter = self.resubmitter.with_shutdown(shutdown);
        self
    }

    /// Share nonce bookkeeping with other submitters on the same chain
    pub fn with_nonce_manager(mut self, nonces: Arc<NonceManager>) -> Self {
        self.nonces = nonces;
        self
    }

    /// Address of the local signer, if any
    pub fn address(&self) -> Option<Address> {
        self.signer.as_ref().map(|signer| signer.address())
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn nonces(&self) -> &NonceManager {
        &self.nonces
    }

    /// Sign locally and resubmit at escalating gas prices until mined
    pub async fn submit_transaction(
        &self,
        tx: &UnsignedTransaction,
        hooks: Option<Arc<dyn SubmissionHooks>>,
    ) -> SubmitterResult<TransactionReceipt> {
        let signer = self
            .signer
            .as_deref()
            .ok_or_else(|| SubmitterError::Config("no local signer configured".to_string()))?;
        let hooks = hooks::or_default(hooks);
        let from = signer.address();
        let (nonce, allocated) = self.resolve_nonce(from, tx).await?;

        let submission = match self.prepare(tx, from, nonce, U256::zero()).await {
            Ok(template) => {
                self.resubmitter
                    .run_with_signer(template, signer, hooks)
                    .await
            }
            Err(e) => Submission::failed(e),
        };

        self.settle_nonce(from, nonce, allocated, &submission).await;
        submission.into_result()
    }

    /// Have `signer` sign once at the starting gas price, then broadcast and
    /// wait on that payload
    pub async fn submit_signed_transaction(
        &self,
        tx: &UnsignedTransaction,
        signer: &dyn ExternalSigner,
        hooks: Option<Arc<dyn SubmissionHooks>>,
    ) -> SubmitterResult<TransactionReceipt> {
        let hooks = hooks::or_default(hooks);
        let from = signer.address().await?;
        let (nonce, allocated) = self.resolve_nonce(from, tx).await?;

        let signed = async {
            let gas_price = self.resubmitter.starting_gas_price().await?;
            let typed = self.prepare(tx, from, nonce, gas_price).await?;

            debug!("Requesting external signature for nonce {} from {:?}", nonce, from);
            tokio::select! {
                biased;
                _ = self.resubmitter.shutdown().cancelled() => Err(SubmitterError::Cancelled),
                signed = signer.sign_transaction(&typed) => signed,
            }
        }
        .await;

        let submission = match signed {
            Ok(raw) => self.resubmitter.run_presigned(raw, hooks).await,
            Err(e) => Submission::failed(e),
        };

        self.settle_nonce(from, nonce, allocated, &submission).await;
        submission.into_result()
    }

    /// Caller's nonce if given, otherwise a freshly allocated one
    async fn resolve_nonce(
        &self,
        from: Address,
        tx: &UnsignedTransaction,
    ) -> SubmitterResult<(U256, bool)> {
        match tx.nonce {
            Some(nonce) => Ok((nonce, false)),
            None => Ok((self.nonces.allocate(from).await?, true)),
        }
    }

    async fn prepare(
        &self,
        tx: &UnsignedTransaction,
        from: Address,
        nonce: U256,
        gas_price: U256,
    ) -> SubmitterResult<TypedTransaction> {
        let mut typed = tx.to_typed(from, nonce, tx.gas_limit, gas_price, self.chain_id);
        if tx.gas_limit.is_none() {
            let estimate = self.client.estimate_gas(&typed).await?;
            debug!("Estimated gas limit {} for nonce {}", estimate, nonce);
            typed.set_gas(estimate);
        }
        Ok(typed)
    }

    /// A failed submission gives its nonce back only if nothing was
    /// broadcast. Otherwise an attempt may still be pending under it and the
    /// nonce stays reserved until a sync finds it mined.
    async fn settle_nonce(&self, from: Address, nonce: U256, allocated: bool, submission: &Submission) {
        if !allocated {
            return;
        }

        let error = match &submission.result {
            Ok(_) => {
                self.nonces.confirm(from, nonce).await;
                return;
            }
            Err(e) => e,
        };

        if submission.broadcasts == 0 {
            self.nonces.release(from, nonce).await;
        } else {
            warn!(
                "Nonce {} for {:?} stays reserved: {} attempt(s) may still be pending",
                nonce, from, submission.broadcasts
            );
        }

        if is_nonce_too_low(error) {
            warn!("Nonce {} too low for {:?}, syncing with chain", nonce, from);
            if let Err(sync_err) = self.nonces.sync(from).await {
                warn!("Nonce sync failed for {:?}: {}", from, sync_err);
            }
        }
    }
}

fn is_nonce_too_low(error: &SubmitterError) -> bool {
    match error {
        SubmitterError::Transport(message) => message.contains("nonce too low"),
        SubmitterError::Nonce { .. } => true,
        _ => false,
    }
}
