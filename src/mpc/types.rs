//! Wire types of the MPC signing service

use crate::codec::to_quantity;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, NameOrAddress, U256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope every MPC endpoint answers with
#[derive(Debug, Deserialize)]
pub(crate) struct MpcEnvelope<T> {
    pub result: Option<T>,
    pub error: Option<Value>,
}

impl<T> MpcEnvelope<T> {
    /// The result, unless the service flagged an error
    pub fn into_result(self) -> Option<T> {
        match self.error {
            Some(ref error) if !error.is_null() => None,
            _ => self.result,
        }
    }
}

/// Key currently held by the MPC network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpcKeyInfo {
    pub mpc_address: String,
    /// Metadata passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Accepted signing proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpcProposal {
    pub id: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MpcProposal {
    /// Proposal id as used in the sign status path
    pub fn id_string(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct MpcSignStatus {
    #[serde(default)]
    pub signed_tx: Option<String>,
}

/// Body of a signing proposal. Quantities are hex strings without leading
/// zeros.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MpcSignRequest {
    pub mpc_address: String,
    pub chain_id: String,
    pub to: String,
    pub value: String,
    pub data: String,
    pub nonce: String,
    pub gas_limit: String,
    pub gas_price: String,
}

impl MpcSignRequest {
    /// Build a proposal for `tx` signed by `mpc_address`
    pub fn from_transaction(mpc_address: Address, chain_id: u64, tx: &TypedTransaction) -> Self {
        let to = match tx.to() {
            Some(NameOrAddress::Address(address)) => format!("{:?}", address),
            Some(NameOrAddress::Name(name)) => name.clone(),
            None => String::new(),
        };
        let data = tx
            .data()
            .map(|data| format!("0x{}", hex::encode(data)))
            .unwrap_or_else(|| "0x".to_string());

        Self {
            mpc_address: format!("{:?}", mpc_address),
            chain_id: to_quantity(U256::from(chain_id)),
            to,
            value: to_quantity(tx.value().copied().unwrap_or_default()),
            data,
            nonce: to_quantity(tx.nonce().copied().unwrap_or_default()),
            gas_limit: to_quantity(tx.gas().copied().unwrap_or_default()),
            gas_price: to_quantity(tx.gas_price().unwrap_or_default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::TransactionRequest;

    #[test]
    fn error_field_hides_result() {
        let envelope: MpcEnvelope<MpcSignStatus> =
            serde_json::from_str(r#"{"result":{"signed_tx":"0x01"},"error":"busy"}"#).unwrap();
        assert!(envelope.into_result().is_none());

        let envelope: MpcEnvelope<MpcSignStatus> =
            serde_json::from_str(r#"{"result":{"signed_tx":"0x01"},"error":null}"#).unwrap();
        assert_eq!(envelope.into_result().unwrap().signed_tx.as_deref(), Some("0x01"));
    }

    #[test]
    fn key_info_keeps_extra_metadata() {
        let envelope: MpcEnvelope<MpcKeyInfo> =
            serde_json::from_str(r#"{"result":{"mpc_address":"0xabc","threshold":2}}"#).unwrap();
        let info = envelope.into_result().unwrap();
        assert_eq!(info.mpc_address, "0xabc");
        assert_eq!(info.extra.get("threshold"), Some(&Value::from(2)));
    }

    #[test]
    fn missing_fields_read_as_absent() {
        let envelope: MpcEnvelope<MpcKeyInfo> = serde_json::from_str(r#"{"error":"no key"}"#).unwrap();
        assert!(envelope.result.is_none());
        assert!(envelope.into_result().is_none());

        let envelope: MpcEnvelope<MpcKeyInfo> = serde_json::from_str("{}").unwrap();
        assert!(envelope.error.is_none());
        assert!(envelope.into_result().is_none());
    }

    #[test]
    fn proposal_ids_may_be_numbers() {
        let proposal: MpcProposal = serde_json::from_str(r#"{"id":17,"status":"pending"}"#).unwrap();
        assert_eq!(proposal.id_string(), "17");

        let proposal: MpcProposal = serde_json::from_str(r#"{"id":"a-1"}"#).unwrap();
        assert_eq!(proposal.id_string(), "a-1");
    }

    #[test]
    fn sign_request_uses_compact_quantities() {
        let tx: TypedTransaction = TransactionRequest::new()
            .to(Address::repeat_byte(0x11))
            .value(0u64)
            .data(vec![0x00, 0x0a])
            .nonce(10u64)
            .gas(21_000u64)
            .gas_price(1_000_000_000u64)
            .into();

        let request = MpcSignRequest::from_transaction(Address::repeat_byte(0x22), 1, &tx);

        assert_eq!(request.chain_id, "0x1");
        assert_eq!(request.value, "0x0");
        assert_eq!(request.nonce, "0xa");
        assert_eq!(request.gas_limit, "0x5208");
        assert_eq!(request.gas_price, "0x3b9aca00");
        assert_eq!(request.data, "0x000a");
        assert_eq!(request.to, format!("{:?}", Address::repeat_byte(0x11)));
    }
}
