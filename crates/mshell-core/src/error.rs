//! Core error types for mshell

use mshell_protocol::{ProtocolError, RecordKind};
use std::path::PathBuf;
use thiserror::Error;

/// Secure channel errors
///
/// Every variant except `MessageTooLarge` is terminal for the session that
/// produced it.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Handshake did not complete (wrong identity, malformed hello, EOF)
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Handshake did not complete in time
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// A sealed record failed authentication
    #[error("Failed to open sealed record")]
    Decrypt,

    /// Sealing a record failed
    #[error("Failed to seal record")]
    Encrypt,

    /// A record of the wrong kind arrived for the session state
    #[error("Unexpected {0:?} record")]
    UnexpectedRecord(RecordKind),

    /// The per-direction message counter ran out
    #[error("Nonce space exhausted")]
    NonceExhausted,

    /// Contents exceed [`MAX_MESSAGE_SIZE`](crate::MAX_MESSAGE_SIZE); nothing was sent
    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The session is closed (locally, by Shutdown, or by EOF)
    #[error("Channel closed")]
    Closed,

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Identity key errors
#[derive(Error, Debug)]
pub enum IdentityError {
    /// Key file could not be opened
    #[error("Key file not found: {path}")]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Key file holds fewer bytes than a key
    #[error("Key file too short: {path} (expected {expected} bytes)")]
    TooShort { path: PathBuf, expected: usize },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
