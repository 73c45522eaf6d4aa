//! Tokio codec for framed records

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{RecordHeader, RecordKind, MAX_PAYLOAD_SIZE};

/// A complete record with kind and payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Record kind from the header
    pub kind: RecordKind,
    /// Raw payload (ciphertext for `Data` and `Confirm`)
    pub payload: Bytes,
}

impl Record {
    /// Create a new record
    pub fn new(kind: RecordKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }
}

/// Codec for encoding/decoding records
#[derive(Debug, Default)]
pub struct RecordCodec {
    /// Current header being decoded (if any)
    pending_header: Option<RecordHeader>,
}

impl RecordCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            pending_header: None,
        }
    }
}

impl Decoder for RecordCodec {
    type Item = Record;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => match RecordHeader::decode(src)? {
                Some(h) => h,
                None => return Ok(None),
            },
        };

        let payload_len = header.payload_length as usize;
        if src.len() < payload_len {
            src.reserve(payload_len - src.len());
            self.pending_header = Some(header);
            return Ok(None);
        }

        let payload = src.split_to(payload_len).freeze();

        Ok(Some(Record {
            kind: header.kind,
            payload,
        }))
    }
}

impl Encoder<Record> for RecordCodec {
    type Error = ProtocolError;

    fn encode(&mut self, record: Record, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload_len = record.payload.len();
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let header = RecordHeader::new(record.kind, payload_len as u32);
        header.encode(dst);
        dst.extend_from_slice(&record.payload);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::HEADER_SIZE;

    #[test]
    fn test_codec_data_record() {
        let mut codec = RecordCodec::new();
        let record = Record::new(RecordKind::Data, Bytes::from("sealed bytes"));

        let mut buf = BytesMut::new();
        codec.encode(record.clone(), &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + 12);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, record);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_partial_read() {
        let mut codec = RecordCodec::new();
        let record = Record::new(RecordKind::Hello, vec![7u8; 32]);

        let mut full_buf = BytesMut::new();
        codec.encode(record.clone(), &mut full_buf).unwrap();

        // Header plus part of the payload
        let mut partial = full_buf.split_to(HEADER_SIZE + 10);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full_buf);
        let decoded = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_codec_back_to_back_records() {
        let mut codec = RecordCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Record::new(RecordKind::Hello, vec![1u8; 32]), &mut buf)
            .unwrap();
        codec
            .encode(Record::new(RecordKind::Confirm, vec![2u8; 16]), &mut buf)
            .unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.kind, RecordKind::Hello);
        assert_eq!(second.kind, RecordKind::Confirm);
        assert_eq!(second.payload.len(), 16);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let mut codec = RecordCodec::new();
        let record = Record::new(RecordKind::Data, vec![0u8; MAX_PAYLOAD_SIZE + 1]);
        let mut buf = BytesMut::new();
        assert!(matches!(
            codec.encode(record, &mut buf),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }
}
