//! Transaction submission module with nonce management and gas escalation

pub mod gas;
pub mod hooks;
pub mod nonce;
pub mod resubmit;
pub mod sender;
pub mod types;

pub use gas::GasEscalator;
pub use hooks::{NoopHooks, SubmissionHooks, TracingHooks};
pub use nonce::NonceManager;
pub use resubmit::{Resubmitter, Submission};
pub use sender::{ExternalSigner, TransactionSubmitter};
pub use types::{SubmissionAttempt, SubmissionMode, TransactionResponse, UnsignedTransaction};
