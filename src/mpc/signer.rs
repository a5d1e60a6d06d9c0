//! External signer backed by the MPC signing service

use super::client::MpcClient;
use super::types::MpcSignRequest;
use crate::codec::{base64_to_hex, decode_hex_payload};
use crate::config::MpcConfig;
use crate::error::{SubmitterError, SubmitterResult};
use crate::shutdown::Shutdown;
use crate::tx::ExternalSigner;

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes};
use std::time::Duration;
use tracing::{info, warn};

/// Proposes each transaction to the MPC network and waits for its signature
pub struct MpcSigner {
    client: MpcClient,
    chain_id: u64,
    poll_interval: Duration,
    max_wait: Duration,
    shutdown: Shutdown,
}

impl MpcSigner {
    pub fn new(client: MpcClient, config: &MpcConfig, chain_id: u64) -> Self {
        Self {
            client,
            chain_id,
            poll_interval: config.poll_interval(),
            max_wait: config.max_wait(),
            shutdown: Shutdown::never(),
        }
    }

    pub fn from_config(config: &MpcConfig, chain_id: u64) -> SubmitterResult<Self> {
        let client = MpcClient::new(&config.base_url, config.request_timeout())?;
        info!("MPC signer using service at {}", client.base_url());
        Ok(Self::new(client, config, chain_id))
    }

    /// Stop waiting for signatures when `shutdown` fires
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn client(&self) -> &MpcClient {
        &self.client
    }
}

#[async_trait]
impl ExternalSigner for MpcSigner {
    async fn address(&self) -> SubmitterResult<Address> {
        let info = self
            .client
            .get_latest_mpc()
            .await?
            .ok_or(SubmitterError::MpcUnavailable)?;

        info.mpc_address.parse::<Address>().map_err(|e| {
            SubmitterError::Signing(format!("Invalid MPC address {}: {}", info.mpc_address, e))
        })
    }

    async fn sign_transaction(&self, tx: &TypedTransaction) -> SubmitterResult<Bytes> {
        let from = match tx.from() {
            Some(from) => *from,
            None => self.address().await?,
        };

        let request = MpcSignRequest::from_transaction(from, self.chain_id, tx);
        let proposal = self
            .client
            .propose_mpc_sign(&request)
            .await?
            .ok_or(SubmitterError::MpcRejected)?;
        let id = proposal.id_string();

        let signed = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(SubmitterError::Cancelled),
            signed = self.client.get_mpc_sign_with_timeout(&id, self.max_wait, self.poll_interval) => signed?,
        };

        if signed.is_empty() {
            warn!("MPC proposal {} was not signed in time", id);
            return Err(SubmitterError::MpcTimeout {
                id,
                waited_ms: saturating_millis(self.max_wait),
            });
        }

        decode_signed_payload(&signed)
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Signed payloads arrive as `0x` hex or as base64
pub fn decode_signed_payload(signed: &str) -> SubmitterResult<Bytes> {
    if signed.starts_with("0x") {
        decode_hex_payload(signed)
    } else {
        decode_hex_payload(&base64_to_hex(signed)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ResubmissionConfig, SendErrorPolicy};
    use crate::test_utils::{spawn_mock_server, FakeChain, RecordingHooks, TEST_CHAIN_ID};
    use crate::tx::{TransactionSubmitter, UnsignedTransaction};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
    use ethers::types::U256;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    const MPC_ADDRESS: &str = "0x1111111111111111111111111111111111111111";

    fn mpc_config(base_url: &str) -> MpcConfig {
        MpcConfig {
            base_url: base_url.to_string(),
            poll_interval_ms: 20,
            max_wait_ms: 300,
            request_timeout_ms: 2_000,
        }
    }

    /// Mock service that signs proposal 5 with `signed_tx` and records the
    /// proposal body
    fn mpc_router(signed_tx: Option<&'static str>, proposals: Arc<Mutex<Vec<Value>>>) -> Router {
        Router::new()
            .route(
                "/mpc/latest",
                get(|| async { Json(json!({ "result": { "mpc_address": MPC_ADDRESS } })) }),
            )
            .route(
                "/mpc/propose-mpc-sign",
                post(move |Json(body): Json<Value>| {
                    let proposals = proposals.clone();
                    async move {
                        proposals.lock().unwrap().push(body);
                        Json(json!({ "result": { "id": 5 } }))
                    }
                }),
            )
            .route(
                "/mpc/sign/5",
                get(move || async move {
                    match signed_tx {
                        Some(signed) => Json(json!({ "result": { "signed_tx": signed } })),
                        None => Json(json!({ "result": {} })),
                    }
                }),
            )
    }

    async fn signer_for(router: Router) -> MpcSigner {
        let base_url = spawn_mock_server(router).await;
        MpcSigner::from_config(&mpc_config(&base_url), TEST_CHAIN_ID).unwrap()
    }

    fn typed() -> TypedTransaction {
        UnsignedTransaction::new(Address::repeat_byte(0x22), 3u64.into(), Bytes::new()).to_typed(
            MPC_ADDRESS.parse().unwrap(),
            U256::from(4),
            Some(U256::from(21_000)),
            U256::from(1_000_000_000u64),
            TEST_CHAIN_ID,
        )
    }

    #[test]
    fn decodes_hex_and_base64_payloads() {
        assert_eq!(decode_signed_payload("0xf86c").unwrap(), Bytes::from(vec![0xf8, 0x6c]));
        assert_eq!(
            decode_signed_payload(&BASE64_STANDARD.encode([0xf8, 0x6c])).unwrap(),
            Bytes::from(vec![0xf8, 0x6c])
        );
        assert!(decode_signed_payload("not base64!").is_err());
    }

    #[test]
    fn wait_millis_saturate() {
        assert_eq!(saturating_millis(Duration::from_millis(300)), 300);
        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn resolves_address_from_latest_key() {
        let signer = signer_for(mpc_router(None, Arc::default())).await;
        assert_eq!(signer.address().await.unwrap(), MPC_ADDRESS.parse::<Address>().unwrap());
    }

    #[tokio::test]
    async fn missing_key_is_unavailable() {
        let router = Router::new().route("/mpc/latest", get(|| async { r#"{"result":null}"# }));
        let signer = signer_for(router).await;
        assert!(matches!(signer.address().await, Err(SubmitterError::MpcUnavailable)));
    }

    #[tokio::test]
    async fn signs_through_propose_and_poll() {
        let proposals = Arc::new(Mutex::new(Vec::new()));
        let signed = BASE64_STANDARD.encode([0xf8, 0x6c, 0x04]);
        let signed: &'static str = Box::leak(signed.into_boxed_str());
        let signer = signer_for(mpc_router(Some(signed), proposals.clone())).await;

        let raw = signer.sign_transaction(&typed()).await.unwrap();

        assert_eq!(raw, Bytes::from(vec![0xf8, 0x6c, 0x04]));
        let proposals = proposals.lock().unwrap();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0]["nonce"], json!("0x4"));
        assert_eq!(proposals[0]["gas_price"], json!("0x3b9aca00"));
        assert_eq!(proposals[0]["chain_id"], json!("0x539"));
    }

    #[tokio::test]
    async fn rejected_proposal_is_an_error() {
        let router = Router::new().route(
            "/mpc/propose-mpc-sign",
            post(|| async { r#"{"error":"invalid request"}"# }),
        );
        let signer = signer_for(router).await;

        assert!(matches!(
            signer.sign_transaction(&typed()).await,
            Err(SubmitterError::MpcRejected)
        ));
    }

    #[tokio::test]
    async fn unsigned_proposal_times_out() {
        let signer = signer_for(mpc_router(None, Arc::default())).await;

        match signer.sign_transaction(&typed()).await {
            Err(SubmitterError::MpcTimeout { id, waited_ms }) => {
                assert_eq!(id, "5");
                assert_eq!(waited_ms, 300);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn shutdown_stops_waiting_for_signature() {
        let (trigger, shutdown) = crate::shutdown::channel();
        let signer = signer_for(mpc_router(None, Arc::default()))
            .await
            .with_shutdown(shutdown);
        trigger.trigger();

        assert!(matches!(
            signer.sign_transaction(&typed()).await,
            Err(SubmitterError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn submitter_broadcasts_mpc_signed_payload() {
        let signer = signer_for(mpc_router(Some("0xf86c05"), Arc::default())).await;
        let chain = Arc::new(
            FakeChain::new()
                .with_nonce(4)
                .confirm_send(1, Duration::from_millis(50)),
        );
        let config = ResubmissionConfig {
            resubmission_timeout_ms: 1_000,
            min_gas_price_gwei: Some(1),
            max_gas_price_gwei: 10,
            gas_retry_increment_gwei: 1,
            on_send_error: SendErrorPolicy::Abort,
        };
        let submitter = TransactionSubmitter::new(chain.clone(), config, 1, TEST_CHAIN_ID).unwrap();
        let hooks = Arc::new(RecordingHooks::default());

        let tx = UnsignedTransaction::new(Address::repeat_byte(0x33), 1u64.into(), Bytes::new());
        let receipt = submitter
            .submit_signed_transaction(&tx, &signer, Some(hooks.clone()))
            .await
            .unwrap();

        assert_eq!(chain.sent(), vec![Bytes::from(vec![0xf8, 0x6c, 0x05])]);
        assert_eq!(hooks.responses().len(), 1);
        assert_eq!(receipt.transaction_hash, hooks.responses()[0].hash);
    }
}
