//! Command router: maps decoded messages to async handlers.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use crate::error::{NovagateError, Result};
use crate::protocol::Message;

/// Ambient per-request context handed to handlers.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Remote peer address, when known.
    pub peer_addr: Option<SocketAddr>,
    /// Raw flags of the frame that carried the request.
    pub frame_flags: u8,
}

impl RequestContext {
    /// Context for a request received from `peer_addr` in a frame with
    /// `frame_flags`.
    pub fn new(peer_addr: Option<SocketAddr>, frame_flags: u8) -> Self {
        Self {
            peer_addr,
            frame_flags,
        }
    }
}

/// Boxed future returned by handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Option<Message>>> + Send>>;

/// A command handler.
///
/// Returning `Ok(None)` means "no reply", even when the request was not
/// one-way. Handlers are value-semantics callables shared across
/// connections; any mutable state they capture needs its own
/// synchronization. Implemented for any matching async closure.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, ctx: RequestContext, msg: Message) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(RequestContext, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Message>>> + Send + 'static,
{
    fn handle(&self, ctx: RequestContext, msg: Message) -> HandlerFuture {
        Box::pin(self(ctx, msg))
    }
}

/// The in-process command router.
///
/// Safe for concurrent use: registration takes the write lock, dispatch
/// only a read lock.
pub struct Router {
    handlers: RwLock<HashMap<u16, Arc<dyn Handler>>>,
}

impl Router {
    /// Create an empty router.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register `handler` for `cmd`, replacing any existing handler.
    pub fn register(&self, cmd: u16, handler: impl Handler) {
        self.handlers
            .write()
            .unwrap()
            .insert(cmd, Arc::new(handler));
    }

    /// Dispatch a decoded message to its handler.
    ///
    /// Fails with [`NovagateError::UnknownCommand`] when no handler is
    /// registered for the message's command.
    pub async fn dispatch(&self, ctx: RequestContext, msg: Message) -> Result<Option<Message>> {
        let handler = {
            let handlers = self.handlers.read().unwrap();
            handlers.get(&msg.command).cloned()
        };
        match handler {
            Some(handler) => handler.handle(ctx, msg).await,
            None => Err(NovagateError::UnknownCommand(msg.command)),
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn echo(_ctx: RequestContext, msg: Message) -> HandlerFuture {
        Box::pin(async move { Ok(Some(msg)) })
    }

    #[tokio::test]
    async fn test_dispatch_to_registered_handler() {
        let router = Router::new();
        router.register(0x0001, echo);

        let msg = Message::new(0x0001, 42, Bytes::from_static(b"ping"));
        let reply = router
            .dispatch(RequestContext::default(), msg.clone())
            .await
            .unwrap();
        assert_eq!(reply, Some(msg));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_command() {
        let router = Router::new();
        let msg = Message::new(0x0BAD, 1, Bytes::new());
        let result = router.dispatch(RequestContext::default(), msg).await;
        assert!(matches!(result, Err(NovagateError::UnknownCommand(0x0BAD))));
    }

    #[tokio::test]
    async fn test_register_overwrites() {
        let router = Router::new();
        router.register(1, echo);
        router.register(1, |_ctx: RequestContext, _msg: Message| async {
            Ok(Some(Message::new(1, 0, Bytes::from_static(b"second"))))
        });

        let reply = router
            .dispatch(RequestContext::default(), Message::new(1, 9, Bytes::new()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.payload.as_ref(), b"second");
    }

    #[tokio::test]
    async fn test_handler_may_decline_to_reply() {
        let router = Router::new();
        router.register(2, |_ctx: RequestContext, _msg: Message| async { Ok(None) });

        let reply = router
            .dispatch(RequestContext::default(), Message::new(2, 1, Bytes::new()))
            .await
            .unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_context_carries_frame_flags() {
        let router = Router::new();
        router.register(3, |ctx: RequestContext, msg: Message| async move {
            Ok(Some(Message::new(
                msg.command,
                msg.request_id,
                Bytes::copy_from_slice(&[ctx.frame_flags]),
            )))
        });

        let ctx = RequestContext::new(None, 0x05);
        let reply = router
            .dispatch(ctx, Message::new(3, 1, Bytes::new()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.payload.as_ref(), &[0x05]);
    }
}
