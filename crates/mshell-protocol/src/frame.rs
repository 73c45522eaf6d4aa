//! Record header encoding/decoding
//!
//! Every record on the raw stream starts with one kind byte followed by a
//! 24-bit big-endian payload length.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ProtocolError;

/// Size of the record header in bytes
pub const HEADER_SIZE: usize = 4;

/// Width of the big-endian length field
const LENGTH_BYTES: usize = 3;

/// Largest payload a 24-bit length can describe
pub const MAX_PAYLOAD_SIZE: usize = (1 << (8 * LENGTH_BYTES)) - 1;

/// Kind of record on the raw stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// Handshake: ephemeral public key
    Hello = 0x01,
    /// Handshake: sealed key confirmation
    Confirm = 0x02,
    /// Sealed message
    Data = 0x03,
}

impl RecordKind {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Hello),
            0x02 => Some(Self::Confirm),
            0x03 => Some(Self::Data),
            _ => None,
        }
    }
}

/// Record header containing kind and length information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Kind of record in the payload
    pub kind: RecordKind,
    /// Length of the payload in bytes
    pub payload_length: u32,
}

impl RecordHeader {
    /// Create a new record header
    pub fn new(kind: RecordKind, payload_length: u32) -> Self {
        Self {
            kind,
            payload_length,
        }
    }

    /// Append the 4 header bytes to `dst`
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u8(self.kind.as_u8());
        dst.put_uint(u64::from(self.payload_length), LENGTH_BYTES);
    }

    /// Take a header off the front of `src`
    ///
    /// Leaves `src` untouched and yields `None` until all 4 bytes are buffered.
    /// An unknown kind byte is an error.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }
        let kind_byte = src[0];
        let kind =
            RecordKind::from_u8(kind_byte).ok_or(ProtocolError::UnknownRecordKind(kind_byte))?;

        src.advance(1);
        let payload_length = src.get_uint(LENGTH_BYTES) as u32;
        Ok(Some(Self::new(kind, payload_length)))
    }
}
