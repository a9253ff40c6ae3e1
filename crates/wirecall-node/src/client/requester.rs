//! Request correlator (calling side).
//!
//! Every call owns one entry in the pending table, keyed by a fresh UUID. The
//! entry is settled by exactly one of: a matching response, the call's
//! timeout, its cancellation token, or `stop()`. Removal from the table is the
//! arbiter: whoever removes the entry settles the call, everyone else finds
//! nothing and does nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use wirecall_core::addressing::{accepts_response, Identity};
use wirecall_core::error::Result;
use wirecall_core::protocol::envelope::{decode, CancelEnvelope, RequestEnvelope};
use wirecall_core::protocol::payload::check_size;
use wirecall_core::{Addressing, Envelope, IntoRoute, RpcError, PROTOCOL_VERSION};

use crate::config::RequesterConfig;
use crate::obs::metrics::{outcome_label, RpcMetrics};
use crate::transport::Endpoint;

/// Settled result of one call.
pub type CallResult = std::result::Result<Value, RpcError>;

/// Per-call overrides.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overrides the requester's default timeout.
    pub timeout: Option<Duration>,
    /// Aborts the call when cancelled, including before the call starts.
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

struct Pending {
    route: String,
    tx: oneshot::Sender<CallResult>,
}

struct Inner {
    me: Identity,
    target: Option<String>,
    default_timeout: Duration,
    max_payload_bytes: usize,
    endpoint: Arc<dyn Endpoint>,
    pending: DashMap<String, Pending>,
    closed: AtomicBool,
    metrics: Arc<RpcMetrics>,
}

/// Calling side of the RPC layer. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Requester {
    inner: Arc<Inner>,
}

impl Requester {
    pub fn new(endpoint: impl Endpoint, cfg: RequesterConfig) -> Result<Self> {
        Self::with_metrics(endpoint, cfg, Arc::new(RpcMetrics::new()))
    }

    pub fn with_metrics(
        endpoint: impl Endpoint,
        cfg: RequesterConfig,
        metrics: Arc<RpcMetrics>,
    ) -> Result<Self> {
        cfg.validate()?;
        let id = cfg.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

        let inner = Arc::new(Inner {
            me: Identity::new(id, cfg.bus.clone()),
            target: cfg.target.clone(),
            default_timeout: cfg.default_timeout(),
            max_payload_bytes: cfg.max_payload_bytes,
            endpoint: Arc::new(endpoint),
            pending: DashMap::new(),
            closed: AtomicBool::new(false),
            metrics,
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        inner.endpoint.set_inbound(Some(Arc::new(move |raw| {
            if let Some(inner) = weak.upgrade() {
                inner.on_message(raw);
            }
        })));

        if cfg.auto_start {
            inner.endpoint.start()?;
        }
        tracing::debug!(id = %inner.me.id, target = ?inner.target, bus = ?inner.me.bus, "requester ready");
        Ok(Self { inner })
    }

    /// Begin receiving responses (only needed with `auto_start: false`).
    pub fn start(&self) -> Result<()> {
        self.inner.endpoint.start()
    }

    pub fn id(&self) -> &str {
        &self.inner.me.id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Calls awaiting settlement.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn metrics(&self) -> &Arc<RpcMetrics> {
        &self.inner.metrics
    }

    /// Issue one request and wait for it to settle.
    pub async fn call(&self, route: impl IntoRoute, payload: Value, opts: CallOptions) -> CallResult {
        let res = self.call_inner(route, payload, opts).await;
        self.inner.metrics.calls.inc(&[("outcome", outcome_label(&res))]);
        res
    }

    async fn call_inner(&self, route: impl IntoRoute, payload: Value, opts: CallOptions) -> CallResult {
        let inner = &self.inner;

        // pre-flight: nothing below touches the transport or consumes an id
        if self.is_closed() {
            return Err(RpcError::client_closed());
        }
        let route = route
            .into_route()
            .map_err(|e| e.into_rpc().with_retriable(false))?
            .as_str()
            .to_owned();
        check_size(&payload, inner.max_payload_bytes)
            .map_err(|e| e.into_rpc().with_route(route.as_str()))?;

        let id = Uuid::new_v4().to_string();
        let abort = opts.cancel.unwrap_or_default();
        if abort.is_cancelled() {
            inner.send_cancel(&id);
            return Err(RpcError::cancelled(&route).with_request_id(id));
        }

        let (tx, mut rx) = oneshot::channel();
        inner.enlist(&id, &route, tx)?;
        inner.metrics.calls_pending.inc(&[]);
        let _guard = PendingGuard {
            inner: Arc::clone(inner),
            id: id.clone(),
        };

        let env = Envelope::Request(RequestEnvelope {
            v: PROTOCOL_VERSION,
            id: id.clone(),
            route: route.clone(),
            payload,
            addr: Addressing::new(Some(&inner.me.id), inner.target.as_deref(), inner.me.bus()),
        });
        if let Err(e) = inner.endpoint.send(&env) {
            tracing::debug!(%id, %route, error = %e, "request send failed");
            if inner.pending.remove(&id).is_some() {
                return Err(RpcError::transport(&route, e).with_request_id(id));
            }
            return flatten(rx.await);
        }

        let timeout = opts.timeout.unwrap_or(inner.default_timeout);
        let local = tokio::select! {
            biased;
            res = &mut rx => return flatten(res),
            _ = tokio::time::sleep(timeout) => RpcError::timeout(&route, timeout.as_millis()),
            _ = abort.cancelled() => RpcError::cancelled(&route),
        };

        match inner.settle_locally(&id, local) {
            Some(err) => Err(err),
            // lost the race: the winner has already sent (or is sending) the outcome
            None => flatten(rx.await),
        }
    }

    /// Shut down: reject every pending call with CLIENT_CLOSED and release the
    /// transport. Idempotent.
    pub fn stop(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        inner.endpoint.set_inbound(None);

        let ids: Vec<String> = inner.pending.iter().map(|e| e.key().clone()).collect();
        let drained = ids.len();
        for id in ids {
            if let Some((_, p)) = inner.pending.remove(&id) {
                inner.send_cancel(&id);
                let err = RpcError::client_closed().with_route(p.route).with_request_id(id);
                let _ = p.tx.send(Err(err));
            }
        }
        inner.pending.clear();
        inner.endpoint.close();
        tracing::info!(id = %inner.me.id, drained, "requester stopped");
    }
}

impl Inner {
    /// Enter a call into the pending table. Fails with CLIENT_CLOSED, leaving
    /// the table without the entry, when the requester is closed by now.
    fn enlist(
        &self,
        id: &str,
        route: &str,
        tx: oneshot::Sender<CallResult>,
    ) -> std::result::Result<(), RpcError> {
        self.pending.insert(
            id.to_owned(),
            Pending {
                route: route.to_owned(),
                tx,
            },
        );
        // stop() may have swept the table between the pre-flight check and the insert
        if self.closed.load(Ordering::Acquire) {
            self.pending.remove(id);
            return Err(RpcError::client_closed().with_route(route).with_request_id(id));
        }
        Ok(())
    }

    fn on_message(&self, raw: Value) {
        let env = match decode(raw) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(error = %e, "inbound message dropped");
                return;
            }
        };
        // requests and cancels on a shared medium belong to responders
        let Envelope::Response(resp) = env else {
            return;
        };
        if !accepts_response(&self.me, self.target.as_deref(), &resp.addr) {
            tracing::trace!(id = %resp.id, "response not addressed to us");
            return;
        }
        let Some((id, pending)) = self.pending.remove(&resp.id) else {
            tracing::debug!(id = %resp.id, "late or unknown response ignored");
            return;
        };
        let outcome = resp.into_outcome().map_err(|e| e.with_request_id(id));
        let _ = pending.tx.send(outcome);
    }

    /// Settle a call from the requester's own side (timeout or abort).
    /// `None` means another transition already removed the entry.
    fn settle_locally(&self, id: &str, err: RpcError) -> Option<RpcError> {
        let (_, _pending) = self.pending.remove(id)?;
        self.send_cancel(id);
        tracing::debug!(%id, code = %err.code, "call settled locally");
        Some(err.with_request_id(id))
    }

    /// Best-effort Cancel; cancellation is advisory so send failures are swallowed.
    fn send_cancel(&self, id: &str) {
        let env = Envelope::Cancel(CancelEnvelope::new(
            id,
            Addressing::new(Some(&self.me.id), self.target.as_deref(), self.me.bus()),
        ));
        if let Err(e) = self.endpoint.send(&env) {
            tracing::debug!(%id, error = %e, "cancel send failed");
        }
    }
}

/// Removes the pending entry if the call future is dropped before settling.
struct PendingGuard {
    inner: Arc<Inner>,
    id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.inner.metrics.calls_pending.dec(&[]);
        if self.inner.pending.remove(&self.id).is_some() {
            self.inner.send_cancel(&self.id);
        }
    }
}

fn flatten(res: std::result::Result<CallResult, oneshot::error::RecvError>) -> CallResult {
    res.unwrap_or_else(|_| Err(RpcError::client_closed()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use wirecall_core::protocol::envelope::ResponseEnvelope;
    use wirecall_core::ErrorCode;

    use super::*;
    use crate::transport::{MemoryBus, MemoryEndpoint};

    fn requester() -> (Requester, MemoryEndpoint) {
        let (ep, _peer) = MemoryBus::pair();
        let requester = Requester::new(ep.clone(), RequesterConfig::default()).unwrap();
        (requester, ep)
    }

    fn response_for(requester: &Requester, id: &str, result: Value) -> Value {
        let addr = Addressing::new(Some("server-a"), Some(requester.id()), None);
        Envelope::Response(ResponseEnvelope::success(id, result, addr))
            .to_value()
            .unwrap()
    }

    #[tokio::test]
    async fn local_settle_after_a_response_yields_the_response() {
        let (requester, ep) = requester();
        let inner = &requester.inner;
        let (tx, rx) = oneshot::channel();
        inner.enlist("call-1", "/work", tx).unwrap();

        // the response removes the entry first; the timeout fires right after
        inner.on_message(response_for(&requester, "call-1", json!("done")));
        assert!(inner.settle_locally("call-1", RpcError::timeout("/work", 10)).is_none());

        assert_eq!(flatten(rx.await).unwrap(), json!("done"));
        assert_eq!(requester.pending_count(), 0);
        // the loser sends no Cancel for a call that already settled
        assert_eq!(ep.sent_count(), 0);
    }

    #[tokio::test]
    async fn response_after_a_local_settle_is_ignored() {
        let (requester, ep) = requester();
        let inner = &requester.inner;
        let (tx, rx) = oneshot::channel();
        inner.enlist("call-2", "/work", tx).unwrap();

        let err = inner.settle_locally("call-2", RpcError::cancelled("/work")).unwrap();
        assert_eq!(err.code, ErrorCode::Cancelled);
        assert_eq!(err.request_id.as_deref(), Some("call-2"));
        assert_eq!(ep.sent_count(), 1);

        inner.on_message(response_for(&requester, "call-2", json!("late")));
        // the entry (and its sender) went with the local settle
        assert!(rx.await.is_err());
        assert_eq!(requester.pending_count(), 0);
    }

    #[tokio::test]
    async fn enlisting_on_a_closed_requester_leaves_no_entry() {
        let (requester, ep) = requester();
        let inner = &requester.inner;
        // closed flag set, table already swept: the state stop() leaves behind
        inner.closed.store(true, Ordering::Release);

        let (tx, rx) = oneshot::channel();
        let err = inner.enlist("call-3", "/work", tx).unwrap_err();
        assert_eq!(err.code, ErrorCode::ClientClosed);
        assert_eq!(err.route.as_deref(), Some("/work"));
        assert_eq!(err.request_id.as_deref(), Some("call-3"));
        assert_eq!(requester.pending_count(), 0);
        assert!(rx.await.is_err());
        assert_eq!(ep.sent_count(), 0);
    }

    #[tokio::test]
    async fn calls_after_stop_touch_nothing() {
        let (requester, ep) = requester();
        requester.stop();
        let err = requester
            .call("/work", Value::Null, CallOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ClientClosed);
        assert_eq!(requester.pending_count(), 0);
        assert_eq!(requester.metrics().calls_pending.get(&[]), 0);
        assert_eq!(ep.sent_count(), 0);
    }
}
