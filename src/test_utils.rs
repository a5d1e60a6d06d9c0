//! Shared fakes for unit tests

use crate::chain::{ChainClient, LocalWalletSigner};
use crate::error::{SubmitterError, SubmitterResult};
use crate::tx::{SubmissionAttempt, SubmissionHooks, TransactionResponse};

use async_trait::async_trait;
use axum::Router;
use ethers::signers::LocalWallet;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionReceipt, TxHash, U256, U64};
use ethers::utils::keccak256;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

pub const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const TEST_CHAIN_ID: u64 = 1337;

pub fn test_signer() -> LocalWalletSigner {
    let wallet: LocalWallet = TEST_KEY.parse().unwrap();
    LocalWalletSigner::new(wallet, TEST_CHAIN_ID)
}

pub fn receipt_for(hash: TxHash) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: hash,
        block_number: Some(U64::from(1)),
        status: Some(U64::from(1)),
        ..Default::default()
    }
}

#[derive(Default)]
struct FakeChainState {
    nonce: U256,
    nonce_queries: usize,
    gas_price: U256,
    /// Every payload handed to `send_raw_transaction`, failed ones included
    sent: Vec<Bytes>,
    /// Latest 1-based send index per hash
    hashes: HashMap<TxHash, usize>,
    confirm_after: HashMap<usize, Duration>,
    fail_sends: HashSet<usize>,
    drop_sends: HashSet<usize>,
    fail_waits: HashSet<usize>,
    send_error: Option<String>,
}

/// Scripted chain. Sends are numbered from 1; a send without a script waits
/// forever for its receipt.
#[derive(Default)]
pub struct FakeChain {
    state: Mutex<FakeChainState>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nonce(self, nonce: u64) -> Self {
        self.set_nonce(nonce);
        self
    }

    pub fn with_gas_price(self, wei: U256) -> Self {
        self.state.lock().unwrap().gas_price = wei;
        self
    }

    /// Receipt for send `index` arrives `delay` after it was sent
    pub fn confirm_send(self, index: usize, delay: Duration) -> Self {
        self.state.lock().unwrap().confirm_after.insert(index, delay);
        self
    }

    /// Send `index` is rejected by the node
    pub fn fail_send(self, index: usize) -> Self {
        self.state.lock().unwrap().fail_sends.insert(index);
        self
    }

    /// Send `index` is accepted and then forgotten by the node
    pub fn drop_send(self, index: usize) -> Self {
        self.state.lock().unwrap().drop_sends.insert(index);
        self
    }

    /// Send `index` is accepted, but waiting for its receipt errors
    pub fn fail_wait(self, index: usize) -> Self {
        self.state.lock().unwrap().fail_waits.insert(index);
        self
    }

    /// Message returned by failing sends
    pub fn with_send_error(self, message: &str) -> Self {
        self.state.lock().unwrap().send_error = Some(message.to_string());
        self
    }

    pub fn set_nonce(&self, nonce: u64) {
        self.state.lock().unwrap().nonce = U256::from(nonce);
    }

    pub fn nonce_queries(&self) -> usize {
        self.state.lock().unwrap().nonce_queries
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn send_count(&self) -> usize {
        self.state.lock().unwrap().sent.len()
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn gas_price(&self) -> SubmitterResult<U256> {
        Ok(self.state.lock().unwrap().gas_price)
    }

    async fn pending_nonce(&self, _address: Address) -> SubmitterResult<U256> {
        let mut state = self.state.lock().unwrap();
        state.nonce_queries += 1;
        Ok(state.nonce)
    }

    async fn estimate_gas(&self, _tx: &TypedTransaction) -> SubmitterResult<U256> {
        Ok(U256::from(21_000))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> SubmitterResult<TxHash> {
        let mut state = self.state.lock().unwrap();
        state.sent.push(raw.clone());
        let index = state.sent.len();

        if state.fail_sends.contains(&index) {
            let message = state
                .send_error
                .clone()
                .unwrap_or_else(|| "connection refused".to_string());
            return Err(SubmitterError::Transport(message));
        }

        let hash = TxHash::from(keccak256(&raw));
        state.hashes.insert(hash, index);
        Ok(hash)
    }

    async fn wait_for_transaction(
        &self,
        hash: TxHash,
        _confirmations: usize,
    ) -> SubmitterResult<Option<TransactionReceipt>> {
        let (delay, dropped, failed) = {
            let state = self.state.lock().unwrap();
            let index = state.hashes.get(&hash).copied().unwrap_or_default();
            (
                state.confirm_after.get(&index).copied(),
                state.drop_sends.contains(&index),
                state.fail_waits.contains(&index),
            )
        };

        if failed {
            return Err(SubmitterError::Transport(
                "receipt lookup failed: connection reset".to_string(),
            ));
        }
        if dropped {
            return Ok(None);
        }
        match delay {
            Some(delay) => {
                tokio::time::sleep(delay).await;
                Ok(Some(receipt_for(hash)))
            }
            None => std::future::pending().await,
        }
    }
}

/// Records every hook invocation
#[derive(Default)]
pub struct RecordingHooks {
    attempts: Mutex<Vec<SubmissionAttempt>>,
    responses: Mutex<Vec<TransactionResponse>>,
}

impl RecordingHooks {
    pub fn gas_prices(&self) -> Vec<Option<U256>> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.gas_price)
            .collect()
    }

    pub fn responses(&self) -> Vec<TransactionResponse> {
        self.responses.lock().unwrap().clone()
    }
}

impl SubmissionHooks for RecordingHooks {
    fn before_send_transaction(&self, attempt: &SubmissionAttempt) {
        self.attempts.lock().unwrap().push(attempt.clone());
    }

    fn on_transaction_response(&self, response: &TransactionResponse) {
        self.responses.lock().unwrap().push(response.clone());
    }
}

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn spawn_mock_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", address)
}
