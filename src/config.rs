//! Configuration management for the transaction submitter
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub submitter: SubmitterConfig,
    pub resubmission: ResubmissionConfig,
    pub chain: ChainConfig,
    pub mpc: Option<MpcConfig>,
    pub wallet: WalletConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitterConfig {
    /// Confirmations a receipt needs before a submission counts as mined
    pub confirmations: usize,
}

/// Gas-price escalation parameters
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ResubmissionConfig {
    /// Delay between escalation rounds
    pub resubmission_timeout_ms: u64,
    /// Starting gas price; read from the network when unset
    pub min_gas_price_gwei: Option<u64>,
    pub max_gas_price_gwei: u64,
    /// Linear step added per round
    pub gas_retry_increment_gwei: u64,
    #[serde(default)]
    pub on_send_error: SendErrorPolicy,
}

/// What a failed send does to the rest of the submission
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SendErrorPolicy {
    /// Propagate the error and drop every in-flight attempt
    #[default]
    Abort,
    /// Log it and carry on with the next round and remaining attempts
    Continue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    /// Receipt polling interval for the provider
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MpcConfig {
    pub base_url: String,
    pub poll_interval_ms: u64,
    pub max_wait_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub private_key_env: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl ResubmissionConfig {
    pub fn resubmission_timeout(&self) -> Duration {
        Duration::from_millis(self.resubmission_timeout_ms)
    }

    /// Check the escalation bounds
    pub fn validate(&self) -> Result<()> {
        if self.resubmission_timeout_ms == 0 {
            anyhow::bail!("resubmission_timeout_ms must be greater than zero");
        }
        if let Some(min) = self.min_gas_price_gwei {
            if min > self.max_gas_price_gwei {
                anyhow::bail!(
                    "min_gas_price_gwei ({}) exceeds max_gas_price_gwei ({})",
                    min,
                    self.max_gas_price_gwei
                );
            }
        }
        if self.gas_retry_increment_gwei == 0 {
            tracing::warn!("gas_retry_increment_gwei is 0 - gas price will never escalate");
        }
        Ok(())
    }
}

impl MpcConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Settings {
    /// Load settings from the file named by `SUBMITTER_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("SUBMITTER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&config_str)
    }

    /// Parse settings from TOML text
    pub fn from_toml(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.chain.rpc_urls.is_empty() {
            anyhow::bail!("Chain {} has no RPC URLs configured", self.chain.name);
        }
        if self.submitter.confirmations == 0 {
            anyhow::bail!("confirmations must be at least 1");
        }

        self.resubmission.validate()?;

        if let Some(mpc) = &self.mpc {
            if mpc.base_url.is_empty() {
                anyhow::bail!("MPC base_url is empty");
            }
            if mpc.poll_interval_ms == 0 {
                anyhow::bail!("MPC poll_interval_ms must be greater than zero");
            }
        }

        Ok(())
    }
}

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
