//! Demo client: frame up one request, print the decoded reply.

use std::time::Duration;

use anyhow::{bail, Context};
use bytes::Bytes;
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use novagate::protocol::{
    decode_frame, decode_frame_body, encode_frame_body, Frame, Message, FLAG_ONE_WAY,
};

#[derive(Parser, Debug)]
#[command(name = "novagate-client", about = "Send one Novagate request")]
struct Args {
    /// Server address.
    #[arg(long, default_value = "127.0.0.1:9000")]
    addr: String,

    /// Command id, e.g. 0x0001.
    #[arg(long, default_value = "0x0001", value_parser = parse_u16)]
    cmd: u16,

    /// Frame flags, e.g. 0x04 for one-way, 0x01 for compressed.
    #[arg(long, default_value = "0x00", value_parser = parse_u8)]
    flags: u8,

    /// Payload string.
    #[arg(long, default_value = "ping")]
    payload: String,

    /// Request id.
    #[arg(long, default_value_t = 1)]
    id: u64,
}

fn parse_u16(s: &str) -> Result<u16, String> {
    parse_prefixed(s).and_then(|v| u16::try_from(v).map_err(|_| "out of range".to_string()))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    parse_prefixed(s).and_then(|v| u8::try_from(v).map_err(|_| "out of range".to_string()))
}

fn parse_prefixed(s: &str) -> Result<u64, String> {
    let result = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    result.map_err(|err| err.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut conn = timeout(Duration::from_secs(3), TcpStream::connect(&args.addr))
        .await
        .context("connect timeout")?
        .with_context(|| format!("connect {}", args.addr))?;

    let request = Message::new(args.cmd, args.id, Bytes::from(args.payload.into_bytes()));
    let encoded = request.encode();
    let (flags, body) = encode_frame_body(args.flags, &encoded)?;
    conn.write_all(&Frame::new(flags, &body).encode()).await?;

    if args.flags & FLAG_ONE_WAY != 0 {
        println!(
            "sent one-way: cmd=0x{:04X} request_id={} payload={:?}",
            request.command,
            request.request_id,
            String::from_utf8_lossy(&request.payload),
        );
        return Ok(());
    }

    let mut buf = Vec::with_capacity(4096);
    let mut tmp = [0u8; 2048];
    let reply = loop {
        let n = timeout(Duration::from_secs(3), conn.read(&mut tmp))
            .await
            .context("read timeout")??;
        if n == 0 {
            bail!("connection closed before a full reply arrived");
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some((frame, _)) = decode_frame(&buf)? {
            let body = decode_frame_body(&frame)?;
            break Message::decode(&body)?;
        }
    };

    println!(
        "reply: cmd=0x{:04X} request_id={} payload={:?}",
        reply.command,
        reply.request_id,
        String::from_utf8_lossy(&reply.payload),
    );
    Ok(())
}
