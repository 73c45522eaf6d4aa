//! mshell-protocol: Wire protocol for mshell relay sessions
//!
//! This crate defines the role byte that opens every relay connection, the
//! record framing used on the raw byte stream, and the message types carried
//! inside sealed records.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod role;

pub use codec::{Record, RecordCodec};
pub use error::ProtocolError;
pub use frame::{RecordHeader, RecordKind, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use message::{Message, MessageType};
pub use role::Role;
