//! Frame codec (C1): `<type:u8><payload:bytes>`.
//!
//! The transport (a byte-framed duplex channel, e.g. a WebSocket binary
//! message) delivers whole payload-sized frames; this module only tags and
//! untags the message kind, it does not add its own length prefix.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

/// The closed set of top-level message kinds (`spec.md` §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    RpcRequest = 1,
    RpcResponse = 2,
    OpLog = 3,
    Relation = 4,
    SubsDataBegin = 5,
    SubsDataEnd = 6,
    ShapeDataBegin = 7,
    ShapeDataEnd = 8,
    SubsDataError = 9,
}

impl FrameType {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(FrameType::RpcRequest),
            2 => Some(FrameType::RpcResponse),
            3 => Some(FrameType::OpLog),
            4 => Some(FrameType::Relation),
            5 => Some(FrameType::SubsDataBegin),
            6 => Some(FrameType::SubsDataEnd),
            7 => Some(FrameType::ShapeDataBegin),
            8 => Some(FrameType::ShapeDataEnd),
            9 => Some(FrameType::SubsDataError),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame is empty (missing type byte)")]
    Truncated,
    #[error("unknown frame type tag {0}")]
    UnknownType(u8),
}

/// A decoded frame: its kind and the still-opaque payload bytes. Callers
/// use `message.rs` types plus `bincode` to interpret the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameType,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: FrameType, payload: impl Into<Bytes>) -> Self {
        Frame {
            kind,
            payload: payload.into(),
        }
    }

    /// Encode as `<type:u8><payload>`.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + self.payload.len());
        buf.extend_from_slice(&[self.kind as u8]);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Decode a whole transport frame. A frame with no bytes at all, or a
    /// type byte indexing outside the closed enumeration, is
    /// `MalformedFrame` per `spec.md` §4.1. Text frames are rejected by the
    /// transport layer before reaching this codec (see
    /// `electric-core`'s connection state machine).
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let Some((&tag, payload)) = bytes.split_first() else {
            return Err(FrameError::Truncated);
        };
        let kind = FrameType::from_tag(tag).ok_or(FrameError::UnknownType(tag))?;
        Ok(Frame {
            kind,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_frame() {
        let frame = Frame::new(FrameType::OpLog, Bytes::from_static(b"hello"));
        let encoded = frame.encode();
        assert_eq!(encoded[0], FrameType::OpLog as u8);
        let decoded = Frame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn empty_buffer_is_truncated() {
        assert_eq!(Frame::decode(&[]), Err(FrameError::Truncated));
    }

    #[test]
    fn unknown_type_tag_is_rejected() {
        assert_eq!(Frame::decode(&[0xFF, 1, 2]), Err(FrameError::UnknownType(0xFF)));
    }

    #[test]
    fn empty_payload_is_allowed() {
        let frame = Frame::new(FrameType::SubsDataEnd, Bytes::new());
        let encoded = frame.encode();
        assert_eq!(encoded.len(), 1);
        let decoded = Frame::decode(&encoded).unwrap();
        assert_eq!(decoded.kind, FrameType::SubsDataEnd);
        assert!(decoded.payload.is_empty());
    }
}
