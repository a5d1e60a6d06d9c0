//! HTTP client for the MPC signing service
//!
//! Endpoints answer with a `{result, error}` envelope. Bodies are parsed as
//! JSON only; an empty, non-JSON or error-flagged body is an absent result,
//! not a failure. Request failures and non-2xx statuses are transport errors
//! and are returned as such.

use super::types::{MpcEnvelope, MpcKeyInfo, MpcProposal, MpcSignStatus};
use crate::error::{SubmitterError, SubmitterResult};

use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Stateless client against one MPC service base URL
#[derive(Debug, Clone)]
pub struct MpcClient {
    client: Client,
    base_url: String,
}

impl MpcClient {
    /// Create a client whose requests each time out after `request_timeout`
    pub fn new(base_url: &str, request_timeout: Duration) -> SubmitterResult<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a client reusing an existing connection pool
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sign status URL with `id` escaped as one path segment
    fn sign_url(&self, id: &str) -> SubmitterResult<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            SubmitterError::Config(format!("Invalid MPC base url {}: {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| SubmitterError::Config(format!("Invalid MPC base url {}", self.base_url)))?
            .pop_if_empty()
            .extend(["mpc", "sign", id]);
        Ok(url)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> SubmitterResult<Option<T>> {
        let body = request.send().await?.error_for_status()?.text().await?;
        Ok(parse_result(&body))
    }

    /// Key currently held by the MPC network, if the service reports one
    pub async fn get_latest_mpc(&self) -> SubmitterResult<Option<MpcKeyInfo>> {
        let info: Option<MpcKeyInfo> = self.fetch(self.client.get(self.url("/mpc/latest"))).await?;
        Ok(info.filter(|info| !info.mpc_address.is_empty()))
    }

    /// Propose a signing request; `None` when the service refuses it
    pub async fn propose_mpc_sign<T>(&self, request: &T) -> SubmitterResult<Option<MpcProposal>>
    where
        T: Serialize + ?Sized,
    {
        let proposal: Option<MpcProposal> = self
            .fetch(self.client.post(self.url("/mpc/propose-mpc-sign")).json(request))
            .await?;

        match &proposal {
            Some(p) => info!("MPC sign proposal accepted with id {}", p.id_string()),
            None => warn!("MPC sign proposal returned no result"),
        }
        Ok(proposal)
    }

    /// Signed payload for proposal `id`, or an empty string while pending
    pub async fn get_mpc_sign(&self, id: &str) -> SubmitterResult<String> {
        let status: Option<MpcSignStatus> = self
            .fetch(self.client.get(self.sign_url(id)?))
            .await?;
        Ok(status.and_then(|s| s.signed_tx).unwrap_or_default())
    }

    /// Poll [`get_mpc_sign`](Self::get_mpc_sign) every `interval`, starting
    /// now, until a signature shows up or `max_timeout` has passed since the
    /// first poll. Resolves to an empty string on timeout; a transport error
    /// ends the wait at once. A `max_timeout` too large to represent waits
    /// without a deadline.
    pub async fn get_mpc_sign_with_timeout(
        &self,
        id: &str,
        max_timeout: Duration,
        interval: Duration,
    ) -> SubmitterResult<String> {
        let started = Instant::now();
        let deadline = started.checked_add(max_timeout);
        let mut polls: u32 = 0;

        loop {
            polls += 1;
            let signed = self.get_mpc_sign(id).await?;
            crate::metrics::record_mpc_poll(!signed.is_empty());

            if !signed.is_empty() {
                let elapsed = started.elapsed();
                crate::metrics::record_mpc_sign_latency(elapsed.as_secs_f64());
                info!("MPC signature {} ready after {} poll(s) in {:?}", id, polls, elapsed);
                return Ok(signed);
            }

            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        warn!("No MPC signature for {} after {} poll(s) in {:?}", id, polls, max_timeout);
                        return Ok(String::new());
                    }
                    std::cmp::min(interval, deadline - now)
                }
                None => interval,
            };

            debug!("MPC signature {} pending (poll {})", id, polls);
            sleep(pause).await;
        }
    }
}

fn parse_result<T: DeserializeOwned>(body: &str) -> Option<T> {
    if body.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<MpcEnvelope<T>>(body) {
        Ok(envelope) => envelope.into_result(),
        Err(e) => {
            debug!("Ignoring malformed MPC response: {}", e);
            None
        }
    }
}
