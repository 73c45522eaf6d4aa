//! Secure channel traits

use async_trait::async_trait;

use crate::error::ChannelError;
use mshell_protocol::Message;

/// Authenticated, encrypted, ordered message transport
///
/// A channel is owned by exactly one worker. Any error it returns is terminal
/// for the session, except `MessageTooLarge` from `send`.
#[async_trait]
pub trait SecureChannel: Send {
    /// Send `contents` as a `Normal` message
    ///
    /// Contents longer than [`MAX_MESSAGE_SIZE`](crate::MAX_MESSAGE_SIZE) are
    /// refused with `MessageTooLarge` and the channel stays usable.
    async fn send(&mut self, contents: &[u8]) -> Result<(), ChannelError>;

    /// Receive the next message
    ///
    /// Implementations must be cancel-safe: dropping the future before it
    /// completes must not lose a message, so callers can race it against
    /// other events in `tokio::select!`.
    async fn receive(&mut self) -> Result<Message, ChannelError>;

    /// Rotate the send key, announcing it with a `KeyExchange` message
    async fn rotate_keys(&mut self) -> Result<(), ChannelError>;

    /// Send `Shutdown` (best effort) and release the transport
    async fn close(&mut self) -> Result<(), ChannelError>;
}

/// Opens a fresh secure channel to the relay
#[async_trait]
pub trait Dialer: Send + Sync {
    /// The channel type produced
    type Channel: SecureChannel + 'static;

    /// Connect, announce the role and complete the handshake
    async fn dial(&self) -> Result<Self::Channel, ChannelError>;
}
