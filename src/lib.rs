//! # novagate
//!
//! TCP gateway for a length-prefixed binary RPC protocol.
//!
//! Novagate terminates the wire protocol (outer frame envelope, inner
//! command/request-id message, optional gzip body), routes decoded messages
//! to in-process handlers, and enforces per-connection byte and rate
//! quotas. An ACL subsystem decides whether a `(tenant, user)` pair may
//! access a set of documents, backed either in memory or by Redis.
//!
//! ## Architecture
//!
//! - **Transport** ([`protocol`]): frame and message codecs, flag
//!   validation, compression, and the process-wide method-to-command map.
//! - **Connection core** ([`Server`], [`Router`], [`ConnContext`]): accept
//!   loop with retryable-error backoff, a streaming decoder per
//!   connection, idle/write deadlines, and shutdown fan-out.
//! - **Business bridge** ([`Dispatcher`]): payload-level handlers that
//!   never see frames or headers.
//! - **ACL engine** ([`acl`]): visibility defaulting plus permanent and
//!   time-bounded grants with batch authorization.
//!
//! ## Example
//!
//! ```ignore
//! use novagate::{Router, Server, ServerConfig};
//! use novagate::protocol::{commands, Message};
//!
//! #[tokio::main]
//! async fn main() -> novagate::Result<()> {
//!     let router = Router::new();
//!     router.register(commands::CMD_PING, |_ctx, msg: Message| async move {
//!         Ok(Some(msg))
//!     });
//!
//!     Server::new(router)
//!         .with_config(ServerConfig::default().with_addr("0.0.0.0:9000"))
//!         .listen_and_serve()
//!         .await
//! }
//! ```

pub mod acl;
pub mod config;
pub mod protocol;

mod conn;
mod dispatcher;
mod error;
mod governor;
mod router;
mod server;

pub use conn::handle_conn;
pub use dispatcher::{bridge_handler, Dispatcher, PayloadFuture, PayloadHandler};
pub use error::{NovagateError, Result};
pub use governor::ConnContext;
pub use router::{Handler, HandlerFuture, RequestContext, Router};
pub use server::{Server, ServerConfig, DEFAULT_ADDR, DEFAULT_IDLE_TIMEOUT, DEFAULT_WRITE_TIMEOUT};
