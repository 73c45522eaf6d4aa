//! mshell target daemon
//!
//! Connects to the relay as the target and runs the commands it forwards.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mshell_core::config::{self, DaemonConfig};
use mshell_core::{EndpointIdentity, RelayDialer};
use mshell_protocol::Role;
use mshelld::{FixedDelay, SessionManager, ShellExecutor};

#[derive(Parser)]
#[command(name = "mshelld")]
#[command(about = "mshell target daemon - runs commands forwarded by the relay")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Relay address (overrides config)
    #[arg(short, long)]
    address: Option<String>,

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

    let config_path = args
        .config
        .unwrap_or_else(|| config::default_config_dir().join("mshelld.toml"));
    let mut config: DaemonConfig = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    if let Some(address) = args.address {
        config.mshelld.address = address;
    }

    let identity = EndpointIdentity::load(&config.identity).context("Failed to load keys")?;
    tracing::info!(
        "Daemon key {}, pinned relay {}",
        identity.private.public_key().fingerprint(),
        identity.relay.fingerprint()
    );
    tracing::info!(
        "Relay {}, shell {}, reconnect delay {:?}",
        config.mshelld.address,
        config.mshelld.shell,
        config.mshelld.reconnect_delay
    );

    let dialer = RelayDialer::new(
        config.mshelld.address.clone(),
        Role::Target,
        Arc::new(identity),
        config.schannel.clone(),
    );
    let retry = FixedDelay::from_settings(&config.mshelld);
    let executor = ShellExecutor::new(config.mshelld.shell.clone());

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        cancel_clone.cancel();
    });

    SessionManager::new(dialer, retry, executor, cancel)
        .run()
        .await?;

    tracing::info!("Daemon stopped");
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
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
}
