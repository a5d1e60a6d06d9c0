//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Submission attempts and escalation rounds
//! - Confirmed and failed submissions
//! - Current offered gas price
//! - MPC signature polling

use crate::error::{SubmitterError, SubmitterResult};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Submission metrics
    pub static ref ATTEMPTS_SENT: CounterVec = register_counter_vec!(
        "submitter_attempts_sent_total",
        "Total transaction attempts broadcast",
        &["chain_id", "mode"]
    ).unwrap();

    pub static ref SEND_FAILURES: CounterVec = register_counter_vec!(
        "submitter_send_failures_total",
        "Total attempts the provider refused",
        &["chain_id"]
    ).unwrap();

    pub static ref SUBMISSIONS_CONFIRMED: CounterVec = register_counter_vec!(
        "submitter_submissions_confirmed_total",
        "Total logical submissions that reached the required confirmations",
        &["chain_id"]
    ).unwrap();

    pub static ref SUBMISSIONS_FAILED: CounterVec = register_counter_vec!(
        "submitter_submissions_failed_total",
        "Total logical submissions that ended in an error",
        &["chain_id"]
    ).unwrap();

    pub static ref GAS_PRICE_GWEI: GaugeVec = register_gauge_vec!(
        "submitter_gas_price_gwei",
        "Gas price offered by the latest attempt",
        &["chain_id"]
    ).unwrap();

    pub static ref ROUNDS_TO_CONFIRM: HistogramVec = register_histogram_vec!(
        "submitter_rounds_to_confirm",
        "Escalation rounds issued before a submission confirmed",
        &["chain_id"],
        vec![1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0]
    ).unwrap();

    // MPC metrics
    pub static ref MPC_POLLS: CounterVec = register_counter_vec!(
        "submitter_mpc_sign_polls_total",
        "Total MPC signature polls by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref MPC_SIGN_LATENCY: HistogramVec = register_histogram_vec!(
        "submitter_mpc_sign_latency_seconds",
        "Time from proposal to signed payload",
        &[],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> SubmitterResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| SubmitterError::Config(format!("cannot bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| SubmitterError::Internal(e.to_string()))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// Helper functions to record metrics

pub fn record_attempt_sent(chain_id: u64, mode: &str) {
    ATTEMPTS_SENT
        .with_label_values(&[&chain_id.to_string(), mode])
        .inc();
}

pub fn record_send_failure(chain_id: u64) {
    SEND_FAILURES
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_submission_confirmed(chain_id: u64, rounds: u32) {
    SUBMISSIONS_CONFIRMED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
    ROUNDS_TO_CONFIRM
        .with_label_values(&[&chain_id.to_string()])
        .observe(rounds as f64);
}

pub fn record_submission_failed(chain_id: u64) {
    SUBMISSIONS_FAILED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_gas_price(chain_id: u64, gas_price_gwei: f64) {
    GAS_PRICE_GWEI
        .with_label_values(&[&chain_id.to_string()])
        .set(gas_price_gwei);
}

pub fn record_mpc_poll(signed: bool) {
    MPC_POLLS
        .with_label_values(&[if signed { "signed" } else { "pending" }])
        .inc();
}

pub fn record_mpc_sign_latency(latency_secs: f64) {
    MPC_SIGN_LATENCY.with_label_values(&[]).observe(latency_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handler_renders_recorded_series() {
        record_attempt_sent(31337, "local");
        record_gas_price(31337, 12.5);

        let body = metrics_handler().await.unwrap();
        assert!(body.contains("submitter_attempts_sent_total"));
        assert!(body.contains("submitter_gas_price_gwei{chain_id=\"31337\"} 12.5"));
    }
}
