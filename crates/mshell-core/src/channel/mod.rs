//! Secure channel implementations

mod cipher;
mod handshake;
mod memory;
mod schannel;

pub use memory::MemoryChannel;
pub use schannel::{ChannelState, Schannel};

use mshell_protocol::MAX_PAYLOAD_SIZE;

/// Largest contents a single `Normal` message can carry
///
/// A data record holds the message type byte, the contents and the AEAD tag.
pub const MAX_MESSAGE_SIZE: usize = MAX_PAYLOAD_SIZE - 1 - cipher::TAG_SIZE;
