//! Inner message codec.
//!
//! A message is the decoded unit inside a frame body: a 16-bit command, a
//! 64-bit request id, and an opaque payload. Both integers are big-endian.

use bytes::Bytes;

use crate::error::{NovagateError, Result};

/// Fixed message header length: command (2) + request id (8).
pub const MESSAGE_HEADER_LEN: usize = 10;

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Command identifier, opaque to the transport.
    pub command: u16,
    /// Client-side correlation id. Zero in a reply means "copy from the
    /// request".
    pub request_id: u64,
    /// Application payload; may be empty.
    pub payload: Bytes,
}

impl Message {
    /// Create a new message.
    pub fn new(command: u16, request_id: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            request_id,
            payload: payload.into(),
        }
    }

    /// Encode into the wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MESSAGE_HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&self.command.to_be_bytes());
        buf.extend_from_slice(&self.request_id.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode from a (decompressed) frame body.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < MESSAGE_HEADER_LEN {
            return Err(NovagateError::MessageTooShort(data.len()));
        }
        Ok(Self {
            command: u16::from_be_bytes([data[0], data[1]]),
            request_id: u64::from_be_bytes([
                data[2], data[3], data[4], data[5], data[6], data[7], data[8], data[9],
            ]),
            payload: Bytes::copy_from_slice(&data[MESSAGE_HEADER_LEN..]),
        })
    }
}
