//! Gas-price escalating resubmission loop
//!
//! Each round broadcasts one attempt and then waits up to the resubmission
//! timeout for *any* outstanding attempt to confirm. Earlier attempts are not
//! cancelled when a new round starts; they stay in the round's [`JoinSet`]
//! until one of them confirms, at which point the whole set is aborted and
//! exactly one receipt is returned.

use super::gas::{wei_to_gwei, GasEscalator};
use super::hooks::SubmissionHooks;
use super::types::{SubmissionAttempt, SubmissionMode, TransactionResponse};
use crate::chain::{ChainClient, TransactionSigner};
use crate::config::{ResubmissionConfig, SendErrorPolicy};
use crate::error::{SubmitterError, SubmitterResult};
use crate::shutdown::Shutdown;

use chrono::Utc;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Bytes, TransactionReceipt, TxHash, U256};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Where each round's signed payload comes from
enum AttemptSource<'a> {
    Signer {
        template: TypedTransaction,
        signer: &'a dyn TransactionSigner,
    },
    PreSigned {
        raw: Bytes,
    },
}

impl AttemptSource<'_> {
    fn mode(&self) -> SubmissionMode {
        match self {
            AttemptSource::Signer { .. } => SubmissionMode::SignPerAttempt,
            AttemptSource::PreSigned { .. } => SubmissionMode::PreSigned,
        }
    }
}

/// How a single in-flight attempt ended
#[derive(Debug)]
enum AttemptOutcome {
    Confirmed {
        round: u32,
        receipt: TransactionReceipt,
    },
    /// The node forgot the transaction before it was mined
    Dropped { round: u32, hash: TxHash },
    SendFailed {
        round: u32,
        error: SubmitterError,
    },
    WaitFailed {
        round: u32,
        hash: TxHash,
        error: SubmitterError,
    },
    /// Acknowledged after another attempt had already settled the submission
    Superseded { round: u32 },
}

/// What the round loop does after an attempt ends
enum Step {
    Settle(SubmitterResult<TransactionReceipt>),
    KeepWaiting,
}

/// How a resubmission run ended
#[derive(Debug)]
pub struct Submission {
    pub result: SubmitterResult<TransactionReceipt>,
    /// Attempts that may have reached the mempool. A send that was
    /// acknowledged, or cut off before the node answered, counts.
    pub broadcasts: usize,
}

impl Submission {
    pub(crate) fn failed(error: SubmitterError) -> Self {
        Self {
            result: Err(error),
            broadcasts: 0,
        }
    }

    pub fn into_result(self) -> SubmitterResult<TransactionReceipt> {
        self.result
    }
}

/// Drives escalation rounds until one attempt confirms
pub struct Resubmitter {
    client: Arc<dyn ChainClient>,
    config: ResubmissionConfig,
    escalator: GasEscalator,
    confirmations: usize,
    chain_id: u64,
    shutdown: Shutdown,
}

impl Resubmitter {
    pub fn new(
        client: Arc<dyn ChainClient>,
        config: ResubmissionConfig,
        confirmations: usize,
        chain_id: u64,
    ) -> SubmitterResult<Self> {
        let escalator = GasEscalator::new(&config)?;
        Ok(Self {
            client,
            config,
            escalator,
            confirmations,
            chain_id,
            shutdown: Shutdown::never(),
        })
    }

    /// Abort submissions when `shutdown` fires
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn config(&self) -> &ResubmissionConfig {
        &self.config
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Gas price for the first round, read from the network when no floor
    /// is configured
    pub async fn starting_gas_price(&self) -> SubmitterResult<U256> {
        let live = if self.escalator.needs_live_price() {
            Some(self.client.gas_price().await?)
        } else {
            None
        };
        Ok(self.escalator.starting_price(live))
    }

    /// Sign `template` afresh at each round's gas price until one attempt
    /// confirms. The template's nonce is reused by every attempt.
    pub async fn resubmit_with_signer(
        &self,
        template: TypedTransaction,
        signer: &dyn TransactionSigner,
        hooks: Arc<dyn SubmissionHooks>,
    ) -> SubmitterResult<TransactionReceipt> {
        self.run_with_signer(template, signer, hooks)
            .await
            .into_result()
    }

    /// Broadcast a fixed signed payload and wait for it, re-broadcasting
    /// only if no broadcast of it is outstanding
    pub async fn resubmit_presigned(
        &self,
        raw: Bytes,
        hooks: Arc<dyn SubmissionHooks>,
    ) -> SubmitterResult<TransactionReceipt> {
        self.run_presigned(raw, hooks).await.into_result()
    }

    /// [`Self::resubmit_with_signer`], also reporting how many attempts
    /// were broadcast
    pub async fn run_with_signer(
        &self,
        template: TypedTransaction,
        signer: &dyn TransactionSigner,
        hooks: Arc<dyn SubmissionHooks>,
    ) -> Submission {
        let start = match self.starting_gas_price().await {
            Ok(start) => start,
            Err(e) => return Submission::failed(e),
        };
        self.run(AttemptSource::Signer { template, signer }, Some(start), hooks)
            .await
    }

    /// [`Self::resubmit_presigned`], also reporting how many attempts were
    /// broadcast
    pub async fn run_presigned(&self, raw: Bytes, hooks: Arc<dyn SubmissionHooks>) -> Submission {
        self.run(AttemptSource::PreSigned { raw }, None, hooks).await
    }

    async fn run(
        &self,
        source: AttemptSource<'_>,
        start_price: Option<U256>,
        hooks: Arc<dyn SubmissionHooks>,
    ) -> Submission {
        let submission_id = Uuid::new_v4();
        let mode = source.mode();
        let settled = Arc::new(AtomicBool::new(false));
        let broadcasts = Arc::new(AtomicUsize::new(0));
        let mut in_flight: JoinSet<AttemptOutcome> = JoinSet::new();
        let mut gas_price = start_price;
        let mut round: u32 = 0;

        info!(
            %submission_id,
            mode = mode.as_str(),
            "Starting submission on chain {} (round timeout {}ms)",
            self.chain_id,
            self.config.resubmission_timeout_ms
        );

        let result = loop {
            if self.shutdown.is_triggered() {
                break Err(SubmitterError::Cancelled);
            }
            round += 1;

            let broadcast = match mode {
                SubmissionMode::SignPerAttempt => true,
                SubmissionMode::PreSigned => in_flight.is_empty(),
            };

            if broadcast {
                let attempt = match self
                    .build_attempt(&source, submission_id, round, gas_price)
                    .await
                {
                    Ok(attempt) => attempt,
                    Err(e) => break Err(e),
                };
                self.spawn_attempt(
                    &mut in_flight,
                    attempt,
                    mode,
                    hooks.clone(),
                    settled.clone(),
                    broadcasts.clone(),
                );
            } else {
                debug!(%submission_id, "Round {}: still waiting on broadcast payload", round);
            }

            let round_timer = sleep(self.config.resubmission_timeout());
            tokio::pin!(round_timer);

            let settled_with = loop {
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => {
                        break Some(Err(SubmitterError::Cancelled));
                    }
                    Some(joined) = in_flight.join_next() => {
                        match self.on_attempt_finished(submission_id, joined) {
                            Step::Settle(result) => break Some(result),
                            Step::KeepWaiting => continue,
                        }
                    }
                    _ = &mut round_timer => break None,
                }
            };

            if let Some(result) = settled_with {
                break result;
            }

            if let Some(current) = gas_price {
                let next = self.escalator.next_price(current);
                if next == current && current == self.escalator.max() {
                    debug!(%submission_id, "Gas price saturated at {} gwei", wei_to_gwei(current));
                }
                gas_price = Some(next);
            }
            info!(
                %submission_id,
                "Round {} timed out with {} attempt(s) in flight",
                round,
                in_flight.len()
            );
        };

        // Late responses must not act on a settled submission
        settled.store(true, Ordering::SeqCst);
        in_flight.abort_all();
        let broadcasts = broadcasts.load(Ordering::SeqCst);

        match &result {
            Ok(receipt) => {
                crate::metrics::record_submission_confirmed(self.chain_id, round);
                info!(
                    %submission_id,
                    "Transaction {:?} confirmed in block {:?} after {} round(s)",
                    receipt.transaction_hash,
                    receipt.block_number,
                    round
                );
            }
            Err(e) => {
                crate::metrics::record_submission_failed(self.chain_id);
                error!(
                    %submission_id,
                    "Submission failed after {} round(s) with {} broadcast(s): {}",
                    round,
                    broadcasts,
                    e
                );
            }
        }

        Submission { result, broadcasts }
    }

    async fn build_attempt(
        &self,
        source: &AttemptSource<'_>,
        submission_id: Uuid,
        round: u32,
        gas_price: Option<U256>,
    ) -> SubmitterResult<SubmissionAttempt> {
        let raw = match source {
            AttemptSource::Signer { template, signer } => {
                let mut tx = template.clone();
                if let Some(price) = gas_price {
                    tx.set_gas_price(price);
                    crate::metrics::record_gas_price(self.chain_id, wei_to_gwei(price));
                }
                signer.sign_transaction(&tx).await?
            }
            AttemptSource::PreSigned { raw } => raw.clone(),
        };

        Ok(SubmissionAttempt {
            submission_id,
            round,
            gas_price,
            raw,
            created_at: Utc::now(),
        })
    }

    fn spawn_attempt(
        &self,
        in_flight: &mut JoinSet<AttemptOutcome>,
        attempt: SubmissionAttempt,
        mode: SubmissionMode,
        hooks: Arc<dyn SubmissionHooks>,
        settled: Arc<AtomicBool>,
        broadcasts: Arc<AtomicUsize>,
    ) {
        let client = self.client.clone();
        let confirmations = self.confirmations;
        let chain_id = self.chain_id;

        in_flight.spawn(async move {
            let round = attempt.round;

            hooks.before_send_transaction(&attempt);
            broadcasts.fetch_add(1, Ordering::SeqCst);
            let hash = match client.send_raw_transaction(attempt.raw.clone()).await {
                Ok(hash) => hash,
                Err(error) => {
                    broadcasts.fetch_sub(1, Ordering::SeqCst);
                    crate::metrics::record_send_failure(chain_id);
                    return AttemptOutcome::SendFailed { round, error };
                }
            };
            crate::metrics::record_attempt_sent(chain_id, mode.as_str());

            if !acknowledge(&attempt, hash, hooks.as_ref(), &settled) {
                return AttemptOutcome::Superseded { round };
            }

            match client.wait_for_transaction(hash, confirmations).await {
                Ok(Some(receipt)) => AttemptOutcome::Confirmed { round, receipt },
                Ok(None) => AttemptOutcome::Dropped { round, hash },
                Err(error) => AttemptOutcome::WaitFailed { round, hash, error },
            }
        });
    }

    fn on_attempt_finished(
        &self,
        submission_id: Uuid,
        joined: Result<AttemptOutcome, JoinError>,
    ) -> Step {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                return Step::Settle(Err(SubmitterError::Internal(format!(
                    "attempt task failed: {}",
                    e
                ))))
            }
        };

        match outcome {
            AttemptOutcome::Confirmed { round, receipt } => {
                if receipt.status == Some(0u64.into()) {
                    warn!(
                        %submission_id,
                        "Attempt from round {} was mined but reverted: {:?}",
                        round,
                        receipt.transaction_hash
                    );
                }
                Step::Settle(Ok(receipt))
            }
            AttemptOutcome::Dropped { round, hash } => {
                warn!(
                    %submission_id,
                    "Attempt {:?} from round {} dropped from the mempool",
                    hash,
                    round
                );
                Step::KeepWaiting
            }
            AttemptOutcome::SendFailed { round, error } => {
                self.on_network_error(submission_id, round, None, error)
            }
            AttemptOutcome::WaitFailed { round, hash, error } => {
                self.on_network_error(submission_id, round, Some(hash), error)
            }
            AttemptOutcome::Superseded { round } => {
                debug!(%submission_id, "Attempt from round {} superseded", round);
                Step::KeepWaiting
            }
        }
    }

    fn on_network_error(
        &self,
        submission_id: Uuid,
        round: u32,
        hash: Option<TxHash>,
        error: SubmitterError,
    ) -> Step {
        match self.config.on_send_error {
            SendErrorPolicy::Abort => {
                error!(
                    %submission_id,
                    "Round {} attempt {:?} failed, aborting submission: {}",
                    round,
                    hash,
                    error
                );
                Step::Settle(Err(error))
            }
            SendErrorPolicy::Continue => {
                warn!(
                    %submission_id,
                    "Round {} attempt {:?} failed, continuing: {}",
                    round,
                    hash,
                    error
                );
                Step::KeepWaiting
            }
        }
    }
}

/// Report an acknowledged attempt. Returns false when the submission has
/// already settled and the attempt should not wait for its receipt.
fn acknowledge(
    attempt: &SubmissionAttempt,
    hash: TxHash,
    hooks: &dyn SubmissionHooks,
    settled: &AtomicBool,
) -> bool {
    info!(
        submission_id = %attempt.submission_id,
        "Transaction sent: {:?} (round {}, gas price {:?})",
        hash,
        attempt.round,
        attempt.gas_price
    );
    hooks.on_transaction_response(&TransactionResponse {
        submission_id: attempt.submission_id,
        round: attempt.round,
        hash,
        gas_price: attempt.gas_price,
    });
    !settled.load(Ordering::SeqCst)
}
