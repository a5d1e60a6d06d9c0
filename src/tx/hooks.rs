//! Observability callbacks around each network send
//!
//! Hooks run synchronously on the submission's tasks. They are meant for
//! logging and metrics and must return quickly.

use super::types::{SubmissionAttempt, TransactionResponse};

use std::sync::Arc;
use tracing::debug;

pub trait SubmissionHooks: Send + Sync {
    /// Called right before an attempt is broadcast
    fn before_send_transaction(&self, _attempt: &SubmissionAttempt) {}

    /// Called once the node has accepted an attempt, including attempts
    /// acknowledged after the submission already settled
    fn on_transaction_response(&self, _response: &TransactionResponse) {}
}

/// Hooks used when the caller supplies none
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl SubmissionHooks for NoopHooks {}

/// Hooks that trace every send at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHooks;

impl SubmissionHooks for TracingHooks {
    fn before_send_transaction(&self, attempt: &SubmissionAttempt) {
        debug!(
            submission_id = %attempt.submission_id,
            round = attempt.round,
            gas_price = ?attempt.gas_price,
            "sending transaction"
        );
    }

    fn on_transaction_response(&self, response: &TransactionResponse) {
        debug!(
            submission_id = %response.submission_id,
            round = response.round,
            hash = ?response.hash,
            "transaction accepted"
        );
    }
}

pub(crate) fn or_default(hooks: Option<Arc<dyn SubmissionHooks>>) -> Arc<dyn SubmissionHooks> {
    hooks.unwrap_or_else(|| Arc::new(NoopHooks))
}
