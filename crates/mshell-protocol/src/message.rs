//! Message types carried by a secure channel
//!
//! A session exchanges three kinds of messages:
//!
//! - `Normal`: opaque payload, either a command line (peer → target) or the
//!   captured output of that command (target → peer)
//! - `KeyExchange`: the sender rotated its traffic key; no payload
//! - `Shutdown`: the sender is closing the session; no payload
//!
//! Inside an encrypted record a message is laid out as one type byte followed
//! by the contents.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Message type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Command line or command output
    Normal = 0x01,
    /// Key rotation notification
    KeyExchange = 0x02,
    /// Session teardown
    Shutdown = 0x03,
}

impl MessageType {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Normal),
            0x02 => Some(Self::KeyExchange),
            0x03 => Some(Self::Shutdown),
            _ => None,
        }
    }
}

/// A message received from (or sent over) a secure channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// What kind of message this is
    pub kind: MessageType,
    /// Payload; empty for `KeyExchange` and `Shutdown`
    pub contents: Bytes,
}

impl Message {
    /// A `Normal` message carrying `contents`
    pub fn normal(contents: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageType::Normal,
            contents: contents.into(),
        }
    }

    /// A key rotation notification
    pub fn key_exchange() -> Self {
        Self {
            kind: MessageType::KeyExchange,
            contents: Bytes::new(),
        }
    }

    /// A shutdown notification
    pub fn shutdown() -> Self {
        Self {
            kind: MessageType::Shutdown,
            contents: Bytes::new(),
        }
    }

    /// Encode into the plaintext layout sealed inside a data record
    pub fn to_plaintext(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(1 + self.contents.len());
        buf.put_u8(self.kind.as_u8());
        buf.extend_from_slice(&self.contents);
        buf
    }

    /// Decode from an opened data record
    ///
    /// Control messages drop whatever follows the type byte.
    pub fn from_plaintext(mut plaintext: Bytes) -> Result<Self, ProtocolError> {
        if plaintext.is_empty() {
            return Err(ProtocolError::EmptyMessage);
        }

        let type_byte = plaintext[0];
        let kind = MessageType::from_u8(type_byte)
            .ok_or(ProtocolError::UnknownMessageType(type_byte))?;
        let contents = match kind {
            MessageType::Normal => plaintext.split_off(1),
            MessageType::KeyExchange | MessageType::Shutdown => Bytes::new(),
        };

        Ok(Self { kind, contents })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_plaintext_layout() {
        let message = Message::normal("echo hello");
        let plaintext = message.to_plaintext();

        assert_eq!(plaintext[0], 0x01);
        assert_eq!(&plaintext[1..], b"echo hello");

        let decoded = Message::from_plaintext(plaintext.freeze()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_control_messages_drop_trailing_bytes() {
        let decoded = Message::from_plaintext(Bytes::from_static(&[0x03, 0xAA, 0xBB])).unwrap();
        assert_eq!(decoded, Message::shutdown());

        let decoded = Message::from_plaintext(Bytes::from_static(&[0x02])).unwrap();
        assert_eq!(decoded, Message::key_exchange());
    }

    #[test]
    fn test_empty_normal_message() {
        let decoded = Message::from_plaintext(Bytes::from_static(&[0x01])).unwrap();
        assert_eq!(decoded.kind, MessageType::Normal);
        assert!(decoded.contents.is_empty());
    }

    #[test]
    fn test_rejects_empty_and_unknown() {
        assert!(matches!(
            Message::from_plaintext(Bytes::new()),
            Err(ProtocolError::EmptyMessage)
        ));
        assert!(matches!(
            Message::from_plaintext(Bytes::from_static(&[0x7F, 1, 2])),
            Err(ProtocolError::UnknownMessageType(0x7F))
        ));
    }
}
