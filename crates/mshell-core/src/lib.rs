//! mshell-core: Core abstractions, secure channel and configuration for mshell
//!
//! This crate provides the identity keys, configuration structures, error
//! types and the `SecureChannel` abstraction shared by the relay, the target
//! daemon and the peer client, together with the `Schannel` implementation
//! of that abstraction.

pub mod channel;
pub mod config;
pub mod dial;
pub mod error;
pub mod identity;
pub mod traits;

pub use channel::{MemoryChannel, Schannel, MAX_MESSAGE_SIZE};
pub use dial::RelayDialer;
pub use error::{ChannelError, ConfigError, IdentityError};
pub use identity::{EndpointIdentity, PrivateKey, PublicKey, RelayIdentity};
pub use traits::{Dialer, SecureChannel};
