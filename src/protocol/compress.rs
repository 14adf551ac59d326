//! Frame flag validation and gzip body transcoding.
//!
//! The decompressed size is capped at [`MAX_FRAME_BODY`], symmetric with
//! the on-wire frame cap, so a small compressed body cannot expand into an
//! arbitrarily large allocation.

use std::borrow::Cow;
use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{NovagateError, Result};
use crate::protocol::frame::{Frame, FLAG_COMPRESSED, FLAG_ENCRYPTED, MAX_FRAME_BODY};

/// Reject frames carrying reserved or unsupported flag bits.
pub fn validate_flags(flags: u8) -> Result<()> {
    if flags & FLAG_ENCRYPTED != 0 {
        return Err(NovagateError::UnsupportedFlags(flags));
    }
    Ok(())
}

/// Validate `flags` and produce the on-wire body for frame encoding.
///
/// With [`FLAG_COMPRESSED`] unset the body passes through unchanged.
pub fn encode_frame_body<'a>(flags: u8, body: &'a [u8]) -> Result<(u8, Cow<'a, [u8]>)> {
    validate_flags(flags)?;
    if flags & FLAG_COMPRESSED == 0 {
        return Ok((flags, Cow::Borrowed(body)));
    }
    Ok((flags, Cow::Owned(gzip_compress(body)?)))
}

/// Validate the frame's flags and return its body decoded for message
/// parsing, decompressing when [`FLAG_COMPRESSED`] is set.
pub fn decode_frame_body<'a>(frame: &Frame<'a>) -> Result<Cow<'a, [u8]>> {
    validate_flags(frame.flags)?;
    if !frame.is_compressed() {
        return Ok(Cow::Borrowed(frame.body));
    }
    Ok(Cow::Owned(gzip_decompress(frame.body, MAX_FRAME_BODY)?))
}

fn gzip_compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn gzip_decompress(data: &[u8], max_output: usize) -> Result<Vec<u8>> {
    // Read one byte past the cap so an at-the-limit stream and an oversized
    // stream are distinguishable.
    let mut limited = GzDecoder::new(data).take(max_output as u64 + 1);
    let mut out = Vec::new();
    limited.read_to_end(&mut out)?;
    if out.len() > max_output {
        return Err(NovagateError::DecompressedTooLarge);
    }
    Ok(out)
}
