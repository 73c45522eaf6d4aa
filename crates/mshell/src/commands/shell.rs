//! Interactive shell command implementation

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::BufReader;

use mshell_core::config::ClientConfig;
use mshell_core::{Dialer, EndpointIdentity, RelayDialer, SecureChannel};
use mshell_protocol::Role;

use crate::output::{print_error, print_info, print_success};
use crate::repl::{self, ReplExit};

/// Connect to the relay as the peer and run the interactive loop
pub async fn shell_command(config: ClientConfig) -> Result<()> {
    let identity = EndpointIdentity::load(&config.identity).context("Failed to load keys")?;
    tracing::debug!(
        "Client key {}, pinned relay {}",
        identity.private.public_key().fingerprint(),
        identity.relay.fingerprint()
    );

    let dialer = RelayDialer::new(
        config.mshell.address.clone(),
        Role::Peer,
        Arc::new(identity),
        config.schannel.clone(),
    );

    print_info(&format!("Connecting to {}...", dialer.address()));
    let mut channel = dialer
        .dial()
        .await
        .with_context(|| format!("Failed to connect to relay at {}", dialer.address()))?;
    print_success("Secure channel established");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let result = repl::run(&mut channel, stdin, &mut stdout).await;

    if let Err(e) = channel.close().await {
        tracing::debug!("Closing channel: {}", e);
    }

    match result {
        Ok(ReplExit::ServerShutdown) => {
            tracing::info!("Relay closed the session");
            Ok(())
        }
        Ok(exit) => {
            tracing::debug!("Session ended: {:?}", exit);
            Ok(())
        }
        Err(e) => {
            print_error(&format!("{}", e));
            Err(e.into())
        }
    }
}
