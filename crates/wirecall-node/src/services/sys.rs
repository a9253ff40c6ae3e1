use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use wirecall_core::error::Result;
use wirecall_core::{ErrorCode, Failure};

use crate::dispatch::{Handler, HandlerResult, RequestCtx, Responder};

/// Upper bound for `/sys/delay/:ms`.
pub const MAX_DELAY_MS: u64 = 60_000;

/// Liveness probe over the RPC path itself.
pub struct PingHandler {
    node: String,
}

#[async_trait]
impl Handler for PingHandler {
    async fn handle(&self, _payload: Value, _ctx: RequestCtx) -> HandlerResult {
        Ok(json!({ "pong": true, "node": self.node }))
    }
}

/// Echoes the path parameter and the payload back.
pub struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    async fn handle(&self, payload: Value, ctx: RequestCtx) -> HandlerResult {
        let text = ctx.param("text").unwrap_or_default();
        Ok(json!({ "text": text, "payload": payload }))
    }
}

/// Sleeps for `:ms` milliseconds unless cancelled first.
pub struct DelayHandler;

#[async_trait]
impl Handler for DelayHandler {
    async fn handle(&self, _payload: Value, ctx: RequestCtx) -> HandlerResult {
        let ms: u64 = ctx
            .param("ms")
            .and_then(|s| s.parse().ok())
            .filter(|ms| *ms <= MAX_DELAY_MS)
            .ok_or_else(|| {
                Failure::coded(
                    ErrorCode::InvalidMessage,
                    format!("delay must be an integer in 0..={MAX_DELAY_MS}"),
                )
            })?;

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(json!({ "slept_ms": ms })),
            _ = ctx.token.cancelled() => Err(Failure::coded(ErrorCode::Cancelled, "delay cancelled")),
        }
    }
}

/// Register `/sys/ping`, `/sys/echo/:text` and `/sys/delay/:ms`.
pub fn register_builtin(responder: &Responder) -> Result<()> {
    responder.register_route(
        "/sys/ping",
        PingHandler {
            node: responder.id().to_owned(),
        },
    )?;
    responder.register_route("/sys/echo/:text", EchoHandler)?;
    responder.register_route("/sys/delay/:ms", DelayHandler)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn ctx(name: &str, value: &str) -> RequestCtx {
        RequestCtx {
            id: "r1".into(),
            route: format!("/sys/x/{value}"),
            matched: format!("/sys/x/:{name}"),
            params: [(name.to_owned(), value.to_owned())].into_iter().collect(),
            token: CancellationToken::new(),
            source: None,
        }
    }

    #[tokio::test]
    async fn echo_returns_param_and_payload() {
        let out = EchoHandler.handle(json!({"a": 1}), ctx("text", "hi")).await.unwrap();
        assert_eq!(out, json!({"text": "hi", "payload": {"a": 1}}));
    }

    #[tokio::test]
    async fn delay_rejects_bad_values() {
        for bad in ["abc", "-1", "60001"] {
            let err = DelayHandler.handle(Value::Null, ctx("ms", bad)).await.unwrap_err();
            assert!(matches!(err, Failure::Rpc(ref e) if e.code == ErrorCode::InvalidMessage));
        }
    }

    #[tokio::test]
    async fn delay_stops_on_cancel() {
        let c = ctx("ms", "5000");
        c.token.cancel();
        let err = DelayHandler.handle(Value::Null, c).await.unwrap_err();
        assert!(matches!(err, Failure::Rpc(ref e) if e.code == ErrorCode::Cancelled));
    }
}
