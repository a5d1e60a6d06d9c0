//! Value types passed through a submission

use chrono::{DateTime, Utc};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, TxHash, U256};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the caller wants mined. Immutable once handed to the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    /// Allocated by the submitter when absent
    pub nonce: Option<U256>,
    /// Estimated through the provider when absent
    pub gas_limit: Option<U256>,
}

impl UnsignedTransaction {
    pub fn new(to: Address, value: U256, data: Bytes) -> Self {
        Self {
            to,
            value,
            data,
            nonce: None,
            gas_limit: None,
        }
    }

    pub fn with_nonce(mut self, nonce: U256) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: U256) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    /// Legacy transaction request with every field the engine pins
    pub(crate) fn to_typed(
        &self,
        from: Address,
        nonce: U256,
        gas_limit: Option<U256>,
        gas_price: U256,
        chain_id: u64,
    ) -> TypedTransaction {
        let mut request = TransactionRequest::new()
            .from(from)
            .to(self.to)
            .value(self.value)
            .data(self.data.clone())
            .nonce(nonce)
            .gas_price(gas_price)
            .chain_id(chain_id);
        if let Some(gas) = gas_limit {
            request = request.gas(gas);
        }
        TypedTransaction::Legacy(request)
    }
}

/// How the attempts of a submission are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionMode {
    /// Signed afresh at each round's gas price
    SignPerAttempt,
    /// One externally signed payload
    PreSigned,
}

impl SubmissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionMode::SignPerAttempt => "local",
            SubmissionMode::PreSigned => "presigned",
        }
    }
}

/// One broadcast of a submission at a specific gas price
#[derive(Debug, Clone)]
pub struct SubmissionAttempt {
    pub submission_id: Uuid,
    /// 1-based escalation round that produced this attempt
    pub round: u32,
    /// Unknown for pre-signed payloads
    pub gas_price: Option<U256>,
    pub raw: Bytes,
    pub created_at: DateTime<Utc>,
}

/// Node acknowledgement for an attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResponse {
    pub submission_id: Uuid,
    pub round: u32,
    pub hash: TxHash,
    pub gas_price: Option<U256>,
}
