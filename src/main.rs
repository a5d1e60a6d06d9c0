//! MPC Tx Submitter - submit one transaction and escalate gas until it is mined
//!
//! Signs locally with the configured wallet, or through the MPC signing
//! service with `--mpc`.

use anyhow::{Context, Result};
use clap::Parser;
use ethers::types::{Address, U256};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use mpc_tx_submitter::chain::{EthersChainClient, LocalWalletSigner};
use mpc_tx_submitter::codec::decode_hex_payload;
use mpc_tx_submitter::config::Settings;
use mpc_tx_submitter::metrics::MetricsServer;
use mpc_tx_submitter::mpc::MpcSigner;
use mpc_tx_submitter::shutdown;
use mpc_tx_submitter::tx::{SubmissionHooks, TracingHooks, TransactionSubmitter, UnsignedTransaction};

const DEFAULT_KEY_ENV: &str = "SUBMITTER_PRIVATE_KEY";

#[derive(Parser, Debug)]
#[command(name = "tx-submitter", version, about = "Submit a transaction with gas escalation")]
struct Args {
    /// Configuration file
    #[arg(long, env = "SUBMITTER_CONFIG", default_value = "config/default.toml")]
    config: PathBuf,

    /// Recipient address
    #[arg(long)]
    to: String,

    /// Value in wei (decimal)
    #[arg(long, default_value = "0")]
    value: String,

    /// Calldata as hex
    #[arg(long, default_value = "0x")]
    data: String,

    /// Use this nonce instead of allocating one
    #[arg(long)]
    nonce: Option<u64>,

    /// Use this gas limit instead of estimating one
    #[arg(long)]
    gas_limit: Option<u64>,

    /// Sign through the MPC service instead of the local wallet
    #[arg(long)]
    mpc: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting MPC Tx Submitter v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let settings = Settings::load_from(&args.config)?;
    info!(
        "Loaded configuration for chain {} ({})",
        settings.chain.name, settings.chain.chain_id
    );

    let tx = build_transaction(&args)?;

    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    let (trigger, shutdown) = shutdown::channel();
    let signal_handle = tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, cancelling submission...");
        trigger.trigger();
    });

    let chain_id = settings.chain.chain_id;
    let client = Arc::new(EthersChainClient::new(settings.chain.clone())?);
    let submitter = TransactionSubmitter::new(
        client,
        settings.resubmission.clone(),
        settings.submitter.confirmations,
        chain_id,
    )?
    .with_shutdown(shutdown.clone());

    let hooks: Option<Arc<dyn SubmissionHooks>> = Some(Arc::new(TracingHooks));
    let result = if args.mpc {
        let mpc_config = settings
            .mpc
            .as_ref()
            .context("--mpc requires an [mpc] section in the configuration")?;
        let signer = MpcSigner::from_config(mpc_config, chain_id)?.with_shutdown(shutdown);
        submitter.submit_signed_transaction(&tx, &signer, hooks).await
    } else {
        let key_env = settings
            .wallet
            .private_key_env
            .as_deref()
            .unwrap_or(DEFAULT_KEY_ENV);
        let signer = LocalWalletSigner::from_env(key_env, chain_id)?;
        submitter
            .with_signer(Arc::new(signer))
            .submit_transaction(&tx, hooks)
            .await
    };

    signal_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    let receipt = result?;
    info!(
        "Transaction {:?} mined in block {:?}",
        receipt.transaction_hash, receipt.block_number
    );
    println!("{}", serde_json::to_string_pretty(&receipt)?);

    Ok(())
}

fn build_transaction(args: &Args) -> Result<UnsignedTransaction> {
    let to: Address = args
        .to
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid recipient address {}: {}", args.to, e))?;
    let value = U256::from_dec_str(&args.value)
        .map_err(|e| anyhow::anyhow!("Invalid value {}: {:?}", args.value, e))?;
    let data = decode_hex_payload(&args.data)?;

    let mut tx = UnsignedTransaction::new(to, value, data);
    if let Some(nonce) = args.nonce {
        tx = tx.with_nonce(nonce.into());
    }
    if let Some(gas_limit) = args.gas_limit {
        tx = tx.with_gas_limit(gas_limit.into());
    }
    Ok(tx)
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,mpc_tx_submitter=debug,hyper=warn,reqwest=warn")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
