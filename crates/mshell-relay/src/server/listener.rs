//! Relay listener
//!
//! Accepts incoming connections and spawns a task for each. The task reads
//! the role byte, runs the secure channel handshake against the key pinned
//! for that role and hands the channel to the matching worker.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use mshell_core::Schannel;
use mshell_protocol::Role;

use crate::server::peer::PeerWorker;
use crate::server::target::TargetWorker;
use crate::state::RelayState;

/// TCP front end of the relay
pub struct RelayServer {
    listener: TcpListener,
    state: Arc<RelayState>,
    cancel: CancellationToken,
}

impl RelayServer {
    /// Bind the configured listen address
    pub async fn bind(state: Arc<RelayState>, cancel: CancellationToken) -> Result<Self> {
        let bind_addr = state.config.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", bind_addr))?;

        Ok(Self {
            listener,
            state,
            cancel,
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until cancelled
    pub async fn run(&self) -> Result<()> {
        tracing::info!("Relay listening on {}", self.local_addr()?);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Relay shutting down");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((socket, peer_addr)) => {
                            self.handle_connection(socket, peer_addr);
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        tracing::debug!("New connection from {}", peer_addr);

        let state = Arc::clone(&self.state);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Connection task cancelled for {}", peer_addr);
                }
                _ = serve_connection(socket, peer_addr, state) => {}
            }
        });
    }
}

/// Read the single role byte a connection starts with
pub async fn read_role_byte<S>(stream: &mut S) -> std::io::Result<u8>
where
    S: AsyncRead + Unpin,
{
    let mut byte = [0u8; 1];
    stream.read_exact(&mut byte).await?;
    Ok(byte[0])
}

async fn serve_connection(mut socket: TcpStream, peer_addr: SocketAddr, state: Arc<RelayState>) {
    let classify_timeout = state.config.classify_timeout;
    let byte = match tokio::time::timeout(classify_timeout, read_role_byte(&mut socket)).await {
        Ok(Ok(byte)) => byte,
        Ok(Err(e)) => {
            tracing::warn!("Failed to read role from {}: {}", peer_addr, e);
            return;
        }
        Err(_) => {
            tracing::warn!(
                "No role from {} within {:?}; dropping connection",
                peer_addr,
                classify_timeout
            );
            return;
        }
    };

    let Some(role) = Role::from_byte(byte) else {
        tracing::warn!(
            "Unknown role byte {:#04x} from {}; connection rejected",
            byte,
            peer_addr
        );
        return;
    };

    if let Err(e) = socket.set_nodelay(true) {
        tracing::debug!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
    }

    let pinned = match role {
        Role::Target => &state.identity.target,
        Role::Peer => &state.identity.peer,
    };
    let channel = match Schannel::listen(
        socket,
        &state.identity.private,
        pinned,
        &state.config.schannel,
    )
    .await
    {
        Ok(channel) => channel,
        Err(e) => {
            tracing::warn!(
                "Secure channel with {} {} failed: {}",
                role,
                peer_addr,
                e
            );
            return;
        }
    };

    tracing::info!("{} connected from {}", role, peer_addr);
    let label = peer_addr.to_string();

    match role {
        Role::Target => {
            let lease = state.queue.attach_target().await;
            let exit = TargetWorker::new(channel, lease, label).run().await;
            tracing::info!("Target {} disconnected ({:?})", peer_addr, exit);
        }
        Role::Peer => {
            let exit = PeerWorker::new(channel, Arc::clone(&state.queue), label)
                .run()
                .await;
            tracing::info!("Peer {} disconnected ({:?})", peer_addr, exit);
        }
    }
}
