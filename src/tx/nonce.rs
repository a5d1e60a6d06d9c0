//! Nonce management for reliable transaction submission
//!
//! Handles:
//! - Local nonce tracking so concurrent submissions from one address never
//!   share a nonce
//! - Returning a nonce to the pool when its submission fails
//! - Re-syncing with the chain after a "nonce too low" rejection
//!
//! Every escalated attempt of one submission reuses the nonce allocated
//! here; that is what makes a higher-priced attempt a replacement rather
//! than a second spend.

use crate::chain::ChainClient;
use crate::error::SubmitterResult;

use dashmap::DashMap;
use ethers::types::{Address, U256};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Per-address nonce state
#[derive(Debug)]
struct AddressNonceState {
    /// Next nonce to hand out
    next: U256,
    /// Nonces held by submissions that have not settled yet
    pending: BTreeSet<U256>,
}

/// Hands out nonces per sending address
pub struct NonceManager {
    client: Arc<dyn ChainClient>,
    /// Lazily initialised from the chain on first use
    state: DashMap<Address, Arc<Mutex<Option<AddressNonceState>>>>,
}

impl NonceManager {
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self {
            client,
            state: DashMap::new(),
        }
    }

    fn slot(&self, address: Address) -> Arc<Mutex<Option<AddressNonceState>>> {
        self.state
            .entry(address)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Allocate the next nonce for an address
    pub async fn allocate(&self, address: Address) -> SubmitterResult<U256> {
        let slot = self.slot(address);
        let mut guard = slot.lock().await;

        let mut state = match guard.take() {
            Some(state) => state,
            None => {
                let on_chain = self.client.pending_nonce(address).await?;
                debug!("Initialized nonce for {:?}: {}", address, on_chain);
                AddressNonceState {
                    next: on_chain,
                    pending: BTreeSet::new(),
                }
            }
        };

        let nonce = state.next;
        state.next = nonce + U256::one();
        state.pending.insert(nonce);
        *guard = Some(state);

        debug!("Allocated nonce {} for {:?}", nonce, address);
        Ok(nonce)
    }

    /// Mark a nonce as mined
    pub async fn confirm(&self, address: Address, nonce: U256) {
        let slot = self.slot(address);
        let mut guard = slot.lock().await;
        if let Some(state) = guard.as_mut() {
            state.pending.remove(&nonce);
        }
    }

    /// Return a nonce whose submission failed
    pub async fn release(&self, address: Address, nonce: U256) {
        let slot = self.slot(address);
        let mut guard = slot.lock().await;
        if let Some(state) = guard.as_mut() {
            state.pending.remove(&nonce);

            // Only the most recent allocation can be handed out again
            if nonce + U256::one() == state.next {
                state.next = nonce;
            }
        }
    }

    /// Sync with on-chain state
    pub async fn sync(&self, address: Address) -> SubmitterResult<()> {
        let on_chain = self.client.pending_nonce(address).await?;
        let slot = self.slot(address);
        let mut guard = slot.lock().await;

        match guard.as_mut() {
            Some(state) => {
                if on_chain > state.next {
                    warn!(
                        "Nonce gap for {:?}: local {}, chain {}",
                        address, state.next, on_chain
                    );
                    state.next = on_chain;
                }
                state.pending.retain(|nonce| *nonce >= on_chain);
            }
            None => {
                *guard = Some(AddressNonceState {
                    next: on_chain,
                    pending: BTreeSet::new(),
                });
            }
        }

        Ok(())
    }

    /// Nonces currently held by unsettled submissions
    pub async fn pending_count(&self, address: Address) -> usize {
        let slot = self.slot(address);
        let guard = slot.lock().await;
        guard.as_ref().map(|s| s.pending.len()).unwrap_or(0)
    }
}
