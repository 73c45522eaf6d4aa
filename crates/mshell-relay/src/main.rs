//! mshell relay server
//!
//! Pairs one pinned peer with one pinned target and forwards command lines
//! and their output between them.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mshell_core::config::{self, RelayConfig};
use mshell_core::RelayIdentity;
use mshell_relay::{RelayServer, RelayState};

#[derive(Parser)]
#[command(name = "mshell-server")]
#[command(about = "mshell relay server")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. ":6000" (overrides config)
    #[arg(short, long)]
    address: Option<String>,

    /// Relay private key (overrides config)
    #[arg(short = 'k', long)]
    key: Option<PathBuf>,

    /// Pinned peer public key (overrides config)
    #[arg(short, long)]
    peer: Option<PathBuf>,

    /// Pinned target public key (overrides config)
    #[arg(short, long)]
    target: Option<PathBuf>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config: RelayConfig = match &args.config {
        Some(path) => config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => RelayConfig::default(),
    };

    if let Some(address) = args.address {
        config.listen_address = address;
    }
    if let Some(key) = args.key {
        config.private_key = key;
    }
    if let Some(peer) = args.peer {
        config.peer_public_key = peer;
    }
    if let Some(target) = args.target {
        config.target_public_key = target;
    }
    config.validate().context("Invalid relay configuration")?;

    let identity = RelayIdentity::load(
        &config.private_key,
        &config.peer_public_key,
        &config.target_public_key,
    )
    .context("Failed to load relay keys")?;

    tracing::info!(
        "Relay key {}, pinned peer {}, pinned target {}",
        identity.private.public_key().fingerprint(),
        identity.peer.fingerprint(),
        identity.target.fingerprint()
    );

    let state = Arc::new(RelayState::new(config, identity));
    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        cancel_clone.cancel();
    });

    let server = RelayServer::bind(state, cancel).await?;
    server.run().await?;

    tracing::info!("Relay shutdown complete");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
