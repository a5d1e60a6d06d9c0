//! MPC Tx Submitter - reliable transaction submission with gas escalation
//!
//! Submits a transaction and keeps re-broadcasting it at rising gas prices
//! until one attempt is mined. Signing happens either in-process or through
//! an external MPC signing service that is polled for its signature.

pub mod chain;
pub mod codec;
pub mod config;
pub mod error;
pub mod metrics;
pub mod mpc;
pub mod shutdown;
pub mod tx;

#[cfg(test)]
mod test_utils;

pub use error::{SubmitterError, SubmitterResult};
