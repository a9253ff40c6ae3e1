use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use wirecall_core::{Failure, Params};

/// What a handler settles with. Failures go through the error mapper before
/// they reach the wire.
pub type HandlerResult = std::result::Result<Value, Failure>;

/// Per-request context handed to a handler.
#[derive(Debug, Clone)]
pub struct RequestCtx {
    /// Request identifier, as chosen by the requester.
    pub id: String,
    /// Concrete path that was called.
    pub route: String,
    /// Descriptor the path matched (`/users/:id`, or a pattern's source).
    pub matched: String,
    /// Extracted parameters; always empty for pattern routes.
    pub params: Params,
    /// Fired when the requester cancels or the responder stops.
    pub token: CancellationToken,
    /// Requester id, when the request carried one.
    pub source: Option<String>,
}

impl RequestCtx {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Route handler. Implemented for async closures
/// `Fn(Value, RequestCtx) -> impl Future<Output = HandlerResult>`; wrap plain
/// functions with [`from_sync`].
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, payload: Value, ctx: RequestCtx) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Value, RequestCtx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, payload: Value, ctx: RequestCtx) -> HandlerResult {
        (self)(payload, ctx).await
    }
}

/// Identity helper that pins a closure to the async handler signature, so
/// its argument and error types need no annotations.
pub fn handler_fn<F, Fut>(f: F) -> F
where
    F: Fn(Value, RequestCtx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    f
}

/// Adapter for synchronous handlers.
pub struct SyncHandler<F>(F);

/// Wrap a synchronous function as a [`Handler`].
pub fn from_sync<F>(f: F) -> SyncHandler<F>
where
    F: Fn(Value, &RequestCtx) -> HandlerResult + Send + Sync + 'static,
{
    SyncHandler(f)
}

#[async_trait]
impl<F> Handler for SyncHandler<F>
where
    F: Fn(Value, &RequestCtx) -> HandlerResult + Send + Sync + 'static,
{
    async fn handle(&self, payload: Value, ctx: RequestCtx) -> HandlerResult {
        (self.0)(payload, &ctx)
    }
}
