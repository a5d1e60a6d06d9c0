//! MPC signing service integration
//!
//! - [`MpcClient`]: HTTP calls against the signing service, with bounded
//!   polling for asynchronous signatures
//! - [`MpcSigner`]: plugs the service into the submitter as an external
//!   signer

pub mod client;
pub mod signer;
pub mod types;

pub use client::MpcClient;
pub use signer::MpcSigner;
pub use types::{MpcKeyInfo, MpcProposal, MpcSignRequest};
