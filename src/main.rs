//! # apim-policy
//!
//! Command-line entry point for the API Management API policy reconciler.
//! See [`cli`] for the available commands.

use anyhow::{Context, Result};
use apim_policy_provider::config::ProviderConfig;
use apim_policy_provider::observability::{logging, metrics};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    // rustls needs an explicit crypto provider when more than one is linked
    if rustls::crypto::CryptoProvider::get_default().is_none() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }

    let cli = cli::Cli::parse();
    let provider = ProviderConfig::from_env().context("Failed to load provider configuration")?;

    logging::init_logging(provider.log_format);
    metrics::register_metrics()?;

    debug!(
        "apim-policy {} (built {}, commit {})",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    let metrics_textfile = cli.metrics_textfile.clone();
    let result = cli::run(cli, provider, cancel).await;
    cli::flush_metrics(metrics_textfile.as_deref());

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}
