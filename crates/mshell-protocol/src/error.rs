//! Protocol error types

use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Unknown record kind in a frame header
    #[error("Unknown record kind: {0:#04x}")]
    UnknownRecordKind(u8),

    /// Unknown message type inside a decrypted record
    #[error("Unknown message type: {0:#04x}")]
    UnknownMessageType(u8),

    /// Decrypted record carried no message type byte
    #[error("Empty message")]
    EmptyMessage,

    /// Payload exceeds maximum size
    #[error("Payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
