//! Error types for the transaction submitter

use thiserror::Error;

/// Main error type for the submitter
#[derive(Error, Debug)]
pub enum SubmitterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chain transport error: {0}")]
    Transport(String),

    #[error("MPC service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Nonce error for {address}: {message}")]
    Nonce { address: String, message: String },

    #[error("Gas estimation error: {0}")]
    GasEstimation(String),

    #[error("No MPC key available from the signing service")]
    MpcUnavailable,

    #[error("MPC signing service rejected the proposal")]
    MpcRejected,

    #[error("No MPC signature for request {id} after {waited_ms}ms")]
    MpcTimeout { id: String, waited_ms: u64 },

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Submission cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SubmitterError {
    /// Check if error is retryable by a higher layer
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubmitterError::Transport(_)
                | SubmitterError::Http(_)
                | SubmitterError::MpcTimeout { .. }
                | SubmitterError::MpcUnavailable
        )
    }
}

/// Result type for submitter operations
pub type SubmitterResult<T> = Result<T, SubmitterError>;
