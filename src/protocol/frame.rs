//! Outer frame envelope codec.
//!
//! Wire format (big-endian):
//! ```text
//! ┌────────────┬─────────────┬───────────┬─────────────┬────────────────┐
//! │ Magic (2B) │ Version (1B)│ Flags (1B)│ Length (4B) │ Body            │
//! │ 0xCA 0xFE  │ 0x01        │ bitfield  │ body length │ (Length bytes)  │
//! └────────────┴─────────────┴───────────┴─────────────┴────────────────┘
//! ```

use crate::error::{NovagateError, Result};

/// Magic number at the start of every frame.
pub const FRAME_MAGIC: u16 = 0xCAFE;

/// Current supported frame version.
pub const FRAME_VERSION: u8 = 1;

/// Fixed frame header length in bytes.
pub const FRAME_HEADER_LEN: usize = 8;

/// Maximum allowed frame body size: 1 MiB.
pub const MAX_FRAME_BODY: usize = 1024 * 1024;

/// Body is gzip-compressed.
pub const FLAG_COMPRESSED: u8 = 1 << 0;

/// Reserved for a future encrypted transport; always rejected.
pub const FLAG_ENCRYPTED: u8 = 1 << 1;

/// No response is expected or produced.
pub const FLAG_ONE_WAY: u8 = 1 << 2;

/// A decoded frame.
///
/// `body` borrows the input buffer; copy or fully consume it before the
/// buffer is compacted or overwritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    pub version: u8,
    pub flags: u8,
    pub body: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Create a frame with the current protocol version.
    pub fn new(flags: u8, body: &'a [u8]) -> Self {
        Self {
            version: FRAME_VERSION,
            flags,
            body,
        }
    }

    /// Whether the one-way flag is set.
    pub fn is_one_way(&self) -> bool {
        self.flags & FLAG_ONE_WAY != 0
    }

    /// Whether the compressed flag is set.
    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    /// Encode this frame into the wire format.
    ///
    /// A zero `version` is written as [`FRAME_VERSION`].
    ///
    /// # Panics
    ///
    /// Panics if the body exceeds [`MAX_FRAME_BODY`]; callers are expected
    /// to respect the body cap, so an oversized body is a programming error.
    pub fn encode(&self) -> Vec<u8> {
        assert!(self.body.len() <= MAX_FRAME_BODY, "frame body too large");

        let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + self.body.len());
        buf.extend_from_slice(&FRAME_MAGIC.to_be_bytes());
        buf.push(if self.version == 0 {
            FRAME_VERSION
        } else {
            self.version
        });
        buf.push(self.flags);
        buf.extend_from_slice(&(self.body.len() as u32).to_be_bytes());
        buf.extend_from_slice(self.body);
        buf
    }
}

/// Decode one frame from the head of `buf`.
///
/// Returns `Ok(None)` when the buffer does not yet hold a complete frame;
/// nothing is consumed in that case. On success, returns the frame and the
/// total number of bytes it occupies (header + body). The frame's body
/// aliases `buf`.
pub fn decode_frame(buf: &[u8]) -> Result<Option<(Frame<'_>, usize)>> {
    if buf.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }

    let magic = u16::from_be_bytes([buf[0], buf[1]]);
    if magic != FRAME_MAGIC {
        return Err(NovagateError::InvalidMagic(magic));
    }

    let version = buf[2];
    if version != FRAME_VERSION {
        return Err(NovagateError::UnsupportedVersion(version));
    }

    let flags = buf[3];
    let length = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
    if length > MAX_FRAME_BODY {
        return Err(NovagateError::FrameTooLarge(length));
    }

    let total = FRAME_HEADER_LEN + length;
    if buf.len() < total {
        return Ok(None);
    }

    let frame = Frame {
        version,
        flags,
        body: &buf[FRAME_HEADER_LEN..total],
    };
    Ok(Some((frame, total)))
}
