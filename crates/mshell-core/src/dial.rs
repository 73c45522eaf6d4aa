//! Outbound connection to the relay
//!
//! Shared by the target daemon and the peer client: open TCP, announce the
//! role with one byte, then run the initiator handshake against the pinned
//! relay key.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use mshell_protocol::Role;

use crate::channel::Schannel;
use crate::config::SchannelConfig;
use crate::error::ChannelError;
use crate::identity::EndpointIdentity;
use crate::traits::Dialer;

/// Dials the relay in a fixed role
#[derive(Debug, Clone)]
pub struct RelayDialer {
    address: String,
    role: Role,
    identity: Arc<EndpointIdentity>,
    config: SchannelConfig,
}

impl RelayDialer {
    /// Create a dialer
    pub fn new(
        address: impl Into<String>,
        role: Role,
        identity: Arc<EndpointIdentity>,
        config: SchannelConfig,
    ) -> Self {
        Self {
            address: address.into(),
            role,
            identity,
            config,
        }
    }

    /// Relay address
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Dialer for RelayDialer {
    type Channel = Schannel<TcpStream>;

    async fn dial(&self) -> Result<Self::Channel, ChannelError> {
        tracing::debug!("Connecting to relay at {} as {}", self.address, self.role);

        let mut stream =
            tokio::time::timeout(self.config.handshake_timeout, TcpStream::connect(&self.address))
                .await
                .map_err(|_| {
                    std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("connecting to {} timed out", self.address),
                    )
                })??;
        stream.set_nodelay(true)?;
        stream.write_all(&[self.role.as_byte()]).await?;

        Schannel::dial(
            stream,
            &self.identity.private,
            &self.identity.relay,
            &self.config,
        )
        .await
    }
}
