//! TCP listener lifecycle: accept loop, retryable-error backoff, and
//! shutdown fan-out.
//!
//! The accept loop runs as its own task and spawns one task per accepted
//! connection. Retryable accept errors (interrupted, aborted, descriptor or
//! buffer exhaustion, timeouts) are logged and retried under exponential
//! backoff; anything else propagates. A shutdown signal stops the accept
//! loop and drops every open connection's socket, so handlers exit through
//! their benign-error path without polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::sleep;

use crate::conn::handle_conn;
use crate::error::Result;
use crate::router::Router;

/// Default listen address.
pub const DEFAULT_ADDR: &str = "0.0.0.0:9000";

/// Default per-connection idle timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default per-write timeout for responses.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Initial accept-error backoff.
const INITIAL_ACCEPT_BACKOFF: Duration = Duration::from_millis(5);

/// Backoff ceiling.
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Server behavior configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP listen address.
    pub addr: String,
    /// Close connections idle for this long; zero disables.
    pub idle_timeout: Duration,
    /// Bound each response write by this; zero disables.
    pub write_timeout: Duration,
}

impl ServerConfig {
    /// Set the listen address.
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Set the idle timeout. Zero disables it.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Set the write timeout. Zero disables it.
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// The Novagate protocol server.
///
/// Register handlers on a [`Router`] first, then hand it to the server;
/// the command table is expected to be complete before serving starts.
pub struct Server {
    config: ServerConfig,
    router: Arc<Router>,
}

impl Server {
    /// Create a server over a configured router, with default config.
    pub fn new(router: Router) -> Self {
        Self {
            config: ServerConfig::default(),
            router: Arc::new(router),
        }
    }

    /// Replace the server configuration.
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Bind the configured address and serve until the process ends.
    pub async fn listen_and_serve(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.addr).await?;
        tracing::info!(addr = %self.config.addr, "novagate listening");
        self.serve(listener).await
    }

    /// Serve connections from an existing listener, without a shutdown
    /// signal.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let (_tx, rx) = watch::channel(false);
        self.serve_with_shutdown(listener, rx).await
    }

    /// Serve connections until `shutdown` fires.
    ///
    /// On shutdown the listener stops accepting, every open connection's
    /// socket is closed, and this returns `Ok`.
    pub async fn serve_with_shutdown(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut backoff = INITIAL_ACCEPT_BACKOFF;

        loop {
            let accepted = tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    backoff = INITIAL_ACCEPT_BACKOFF;
                    tracing::debug!(%peer_addr, "connection accepted");
                    self.spawn_conn(stream, shutdown.clone());
                }
                Err(err) if is_retryable_accept_error(&err) => {
                    tracing::warn!(error = %err, backoff_ms = backoff.as_millis() as u64,
                        "retryable accept error");
                    tokio::select! {
                        _ = shutdown.changed() => return Ok(()),
                        _ = sleep(backoff) => {}
                    }
                    backoff = next_accept_backoff(backoff);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn spawn_conn(&self, stream: TcpStream, mut shutdown: watch::Receiver<bool>) {
        let router = self.router.clone();
        let idle_timeout = self.config.idle_timeout;
        let write_timeout = self.config.write_timeout;
        let peer_addr = stream.peer_addr().ok();

        tokio::spawn(async move {
            let result = tokio::select! {
                // Dropping the handler future closes the socket, which is
                // how connections observe shutdown.
                _ = shutdown.changed() => Ok(()),
                result = handle_conn(stream, &router, idle_timeout, write_timeout, peer_addr) => {
                    result
                }
            };
            match result {
                Ok(()) => tracing::debug!(?peer_addr, "connection closed"),
                Err(err) if err.is_benign_disconnect() => {
                    tracing::debug!(?peer_addr, error = %err, "connection dropped by peer");
                }
                Err(err) => tracing::error!(?peer_addr, error = %err, "connection error"),
            }
        });
    }
}

/// Double the accept backoff, capped at one second.
pub(crate) fn next_accept_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_ACCEPT_BACKOFF)
}

/// Whether an accept error is transient and worth retrying under backoff.
pub(crate) fn is_retryable_accept_error(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;

    if matches!(
        err.kind(),
        ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::ConnectionAborted
            | ErrorKind::TimedOut
            | ErrorKind::OutOfMemory
    ) {
        return true;
    }

    #[cfg(unix)]
    if let Some(errno) = err.raw_os_error() {
        return matches!(
            errno,
            libc::EINTR
                | libc::EAGAIN
                | libc::ECONNABORTED
                | libc::EMFILE
                | libc::ENFILE
                | libc::ENOBUFS
                | libc::ENOMEM
        );
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use crate::protocol::{
        decode_frame, decode_frame_body, encode_frame_body, Frame, Message,
    };
    use crate::router::RequestContext;

    #[test]
    fn test_backoff_doubles_until_capped() {
        let mut backoff = Duration::from_millis(5);
        backoff = next_accept_backoff(backoff);
        assert_eq!(backoff, Duration::from_millis(10));
        backoff = next_accept_backoff(backoff);
        assert_eq!(backoff, Duration::from_millis(20));
    }

    #[test]
    fn test_backoff_capped_at_one_second() {
        let backoff = next_accept_backoff(Duration::from_millis(800));
        assert_eq!(backoff, Duration::from_secs(1));
        assert_eq!(next_accept_backoff(backoff), Duration::from_secs(1));
    }

    #[test]
    fn test_retryable_accept_error_kinds() {
        use std::io::{Error, ErrorKind};

        assert!(is_retryable_accept_error(&Error::new(
            ErrorKind::Interrupted,
            "intr"
        )));
        assert!(is_retryable_accept_error(&Error::new(
            ErrorKind::ConnectionAborted,
            "aborted"
        )));
        assert!(is_retryable_accept_error(&Error::new(
            ErrorKind::TimedOut,
            "timeout"
        )));
        assert!(!is_retryable_accept_error(&Error::new(
            ErrorKind::PermissionDenied,
            "denied"
        )));
    }

    #[cfg(unix)]
    #[test]
    fn test_retryable_accept_errnos() {
        for errno in [libc::EMFILE, libc::ENFILE, libc::ENOBUFS, libc::ENOMEM] {
            let err = std::io::Error::from_raw_os_error(errno);
            assert!(is_retryable_accept_error(&err), "errno {errno}");
        }
        assert!(!is_retryable_accept_error(
            &std::io::Error::from_raw_os_error(libc::EACCES)
        ));
    }

    #[tokio::test]
    async fn test_serve_with_shutdown_returns_ok() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let router = Router::new();
        router.register(0x0001, |_ctx: RequestContext, msg: Message| async move {
            Ok(Some(msg))
        });
        let server = Server::new(router);

        let (tx, rx) = watch::channel(false);
        let serve = tokio::spawn(async move { server.serve_with_shutdown(listener, rx).await });

        // Round-trip one request to prove the loop is live.
        let mut client = TcpStream::connect(addr).await.unwrap();
        let msg = Message::new(0x0001, 7, Bytes::from_static(b"up?"));
        let encoded = msg.encode();
        let (flags, body) = encode_frame_body(0, &encoded).unwrap();
        client
            .write_all(&Frame::new(flags, &body).encode())
            .await
            .unwrap();

        let mut collected = Vec::new();
        let mut tmp = [0u8; 256];
        let reply = loop {
            let n = client.read(&mut tmp).await.unwrap();
            assert!(n > 0);
            collected.extend_from_slice(&tmp[..n]);
            if let Some((frame, _)) = decode_frame(&collected).unwrap() {
                let body = decode_frame_body(&frame).unwrap();
                break Message::decode(&body).unwrap();
            }
        };
        assert_eq!(reply.request_id, 7);

        tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), serve)
            .await
            .expect("serve should stop promptly")
            .unwrap();
        assert!(result.is_ok());
    }
}
