//! Per-connection handler: streaming frame decode, dispatch, reply.
//!
//! Each connection task loops over four steps: read into a scratch block
//! under the idle deadline, reserve buffer quota and append, drain every
//! complete frame from the head of the buffer, then compact. Replies are
//! written inline and strictly in request order; a write is bounded by the
//! write timeout when one is configured.
//!
//! Exit paths: EOF and idle timeout return `Ok`; every decode, governor,
//! dispatch, or write failure is terminal for the connection.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::{NovagateError, Result};
use crate::governor::ConnContext;
use crate::protocol::{
    decode_frame, decode_frame_body, encode_frame_body, Frame, Message, FLAG_COMPRESSED,
};
use crate::router::{RequestContext, Router};

/// Initial capacity of the growable read buffer.
const READ_BUF_INITIAL: usize = 8 * 1024;

/// Size of the fixed scratch block reads land in.
const SCRATCH_LEN: usize = 4 * 1024;

/// Serve one connection until EOF, idle timeout, or a terminal error.
///
/// A zero `idle_timeout` or `write_timeout` disables the respective
/// deadline. The stream is generic so in-memory pipes can stand in for TCP
/// sockets in tests.
pub async fn handle_conn<S>(
    mut stream: S,
    router: &Router,
    idle_timeout: Duration,
    write_timeout: Duration,
    peer_addr: Option<SocketAddr>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let cc = ConnContext::new();
    let mut buf: Vec<u8> = Vec::with_capacity(READ_BUF_INITIAL);
    let mut scratch = [0u8; SCRATCH_LEN];

    loop {
        let n = if idle_timeout.is_zero() {
            stream.read(&mut scratch).await?
        } else {
            match timeout(idle_timeout, stream.read(&mut scratch)).await {
                // Idle deadline reached: graceful shutdown.
                Err(_elapsed) => return Ok(()),
                Ok(result) => result?,
            }
        };
        if n == 0 {
            return Ok(());
        }

        if !cc.reserve(n) {
            return Err(NovagateError::BufferQuotaExceeded);
        }
        buf.extend_from_slice(&scratch[..n]);

        let consumed =
            drain_frames(&mut stream, &buf, &cc, router, write_timeout, peer_addr).await?;
        if consumed > 0 {
            cc.release(consumed);
            let remaining = buf.len() - consumed;
            buf.copy_within(consumed.., 0);
            buf.truncate(remaining);
        }
    }
}

/// Decode and handle every complete frame at the head of `buf`.
///
/// Returns the number of bytes consumed; the caller compacts the buffer.
async fn drain_frames<S>(
    stream: &mut S,
    buf: &[u8],
    cc: &ConnContext,
    router: &Router,
    write_timeout: Duration,
    peer_addr: Option<SocketAddr>,
) -> Result<usize>
where
    S: AsyncWrite + Unpin,
{
    let mut consumed = 0;

    while let Some((frame, frame_len)) = decode_frame(&buf[consumed..])? {
        if !cc.allow() {
            return Err(NovagateError::RateLimited);
        }
        handle_frame(stream, &frame, router, write_timeout, peer_addr).await?;
        consumed += frame_len;
    }

    Ok(consumed)
}

async fn handle_frame<S>(
    stream: &mut S,
    frame: &Frame<'_>,
    router: &Router,
    write_timeout: Duration,
    peer_addr: Option<SocketAddr>,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let one_way = frame.is_one_way();

    let body = decode_frame_body(frame)?;
    let msg = Message::decode(&body)?;
    let request_id = msg.request_id;

    let ctx = RequestContext::new(peer_addr, frame.flags);
    let response = router.dispatch(ctx, msg).await?;

    let mut response = match response {
        Some(response) if !one_way => response,
        _ => return Ok(()),
    };

    // A zero reply id means the handler left correlation to us.
    if response.request_id == 0 {
        response.request_id = request_id;
    }

    // Only the compressed bit propagates to the reply; one-way and reserved
    // bits never do.
    let out_flags = frame.flags & FLAG_COMPRESSED;
    let encoded = response.encode();
    let (out_flags, out_body) = encode_frame_body(out_flags, &encoded)?;
    let out = Frame::new(out_flags, &out_body).encode();

    write_all_with_deadline(stream, &out, write_timeout).await
}

/// Write `data` fully, bounded by `write_timeout` when non-zero.
///
/// The deadline covers the whole burst including partial-write resumption;
/// it does not linger past this call on either exit path.
async fn write_all_with_deadline<S>(
    stream: &mut S,
    data: &[u8],
    write_timeout: Duration,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    if write_timeout.is_zero() {
        stream.write_all(data).await?;
        stream.flush().await?;
        return Ok(());
    }

    match timeout(write_timeout, async {
        stream.write_all(data).await?;
        stream.flush().await
    })
    .await
    {
        Err(_elapsed) => Err(NovagateError::WriteTimeout),
        Ok(result) => {
            result?;
            Ok(())
        }
    }
}
