//! Payload-level dispatcher: the bridge between the protocol transport and
//! business handlers.
//!
//! Business code registers `command -> payload fn` pairs here and never
//! sees frames or message headers. [`bridge_handler`] adapts a dispatcher
//! entry into a router [`Handler`] that re-wraps the returned bytes with
//! the request's command and request id.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use bytes::Bytes;

use crate::error::{NovagateError, Result};
use crate::protocol::Message;
use crate::router::{Handler, HandlerFuture, RequestContext};

/// Boxed future returned by payload handlers.
pub type PayloadFuture = Pin<Box<dyn Future<Output = Result<Bytes>> + Send>>;

/// A payload-level handler: opaque bytes in, opaque bytes out.
pub trait PayloadHandler: Send + Sync + 'static {
    fn handle(&self, ctx: RequestContext, payload: Bytes) -> PayloadFuture;
}

impl<F, Fut> PayloadHandler for F
where
    F: Fn(RequestContext, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes>> + Send + 'static,
{
    fn handle(&self, ctx: RequestContext, payload: Bytes) -> PayloadFuture {
        Box::pin(self(ctx, payload))
    }
}

/// Secondary registry mapping commands to payload handlers.
pub struct Dispatcher {
    handlers: RwLock<HashMap<u16, Arc<dyn PayloadHandler>>>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register `handler` for `cmd`, replacing any existing handler.
    pub fn register(&self, cmd: u16, handler: impl PayloadHandler) {
        self.handlers
            .write()
            .unwrap()
            .insert(cmd, Arc::new(handler));
    }

    /// Forward `payload` to the handler registered for `cmd`.
    pub async fn dispatch(&self, ctx: RequestContext, cmd: u16, payload: Bytes) -> Result<Bytes> {
        let handler = {
            let handlers = self.handlers.read().unwrap();
            handlers.get(&cmd).cloned()
        };
        match handler {
            Some(handler) => handler.handle(ctx, payload).await,
            None => Err(NovagateError::UnknownDispatch(cmd)),
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a router handler for `cmd` that forwards the message payload into
/// `dispatcher` and wraps the reply bytes with the request's command and
/// request id.
pub fn bridge_handler(cmd: u16, dispatcher: Arc<Dispatcher>) -> impl Handler {
    move |ctx: RequestContext, msg: Message| -> HandlerFuture {
        let dispatcher = dispatcher.clone();
        Box::pin(async move {
            let request_id = msg.request_id;
            let out = dispatcher.dispatch(ctx, cmd, msg.payload).await?;
            Ok(Some(Message::new(cmd, request_id, out)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatch_registered_payload_handler() {
        let dispatcher = Dispatcher::new();
        dispatcher.register(0x0001, |_ctx: RequestContext, _payload: Bytes| async {
            Ok(Bytes::from_static(b"pong"))
        });

        let out = dispatcher
            .dispatch(RequestContext::default(), 0x0001, Bytes::from_static(b"ping"))
            .await
            .unwrap();
        assert_eq!(out.as_ref(), b"pong");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_command_fails() {
        let dispatcher = Dispatcher::new();
        let result = dispatcher
            .dispatch(RequestContext::default(), 0x0BAD, Bytes::new())
            .await;
        assert!(matches!(result, Err(NovagateError::UnknownDispatch(0x0BAD))));
    }

    #[tokio::test]
    async fn test_bridge_preserves_command_and_request_id() {
        let dispatcher = Arc::new(Dispatcher::new());
        dispatcher.register(0x0101, |_ctx: RequestContext, payload: Bytes| async move {
            Ok(payload)
        });

        let handler = bridge_handler(0x0101, dispatcher);
        let msg = Message::new(0x0101, 777, Bytes::from_static(b"body"));
        let reply = handler
            .handle(RequestContext::default(), msg)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reply.command, 0x0101);
        assert_eq!(reply.request_id, 777);
        assert_eq!(reply.payload.as_ref(), b"body");
    }

    #[tokio::test]
    async fn test_bridge_propagates_handler_error() {
        let dispatcher = Arc::new(Dispatcher::new());
        dispatcher.register(0x0202, |_ctx: RequestContext, _payload: Bytes| async {
            Err(NovagateError::Handler("boom".into()))
        });

        let handler = bridge_handler(0x0202, dispatcher);
        let result = handler
            .handle(RequestContext::default(), Message::new(0x0202, 1, Bytes::new()))
            .await;
        assert!(matches!(result, Err(NovagateError::Handler(_))));
    }
}
