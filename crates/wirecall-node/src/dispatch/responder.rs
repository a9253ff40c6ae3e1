//! Dispatch engine (serving side).
//!
//! Inbound pipeline per request:
//! 1. addressing filter (drop silently when not meant for us)
//! 2. inbound policy: permission, then payload ceiling (reply on reject)
//! 3. first-match route lookup (reply ROUTE_NOT_FOUND on miss)
//! 4. handler execution under a fresh cancellation token, tracked in the
//!    in-flight table until it settles
//!
//! Every request that passes the filter gets exactly one reply.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Instant;

use dashmap::DashMap;
use futures_util::FutureExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use wirecall_core::addressing::{accepts, Identity};
use wirecall_core::error::{Result, WireError};
use wirecall_core::protocol::envelope::{decode, RequestEnvelope, ResponseEnvelope};
use wirecall_core::route::first_match;
use wirecall_core::{map_error, Addressing, Envelope, ErrorCode, Failure, IntoRoute, RouteDescriptor, RpcError};

use crate::config::ResponderConfig;
use crate::dispatch::handler::{Handler, RequestCtx};
use crate::obs::metrics::{outcome_label, RpcMetrics};
use crate::policy::{InboundPolicy, Permission, PolicyDecision};
use crate::transport::Endpoint;

type RouteTable = Vec<(RouteDescriptor, Arc<dyn Handler>)>;

struct InFlight {
    seq: u64,
    token: CancellationToken,
}

struct Inner {
    me: Identity,
    accept_unaddressed: bool,
    policy: InboundPolicy,
    endpoint: Arc<dyn Endpoint>,
    routes: RwLock<RouteTable>,
    in_flight: DashMap<String, InFlight>,
    seq: AtomicU64,
    closed: AtomicBool,
    metrics: Arc<RpcMetrics>,
}

/// Serving side of the RPC layer. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Responder {
    inner: Arc<Inner>,
}

pub struct ResponderBuilder<E> {
    endpoint: E,
    cfg: ResponderConfig,
    permission: Option<Permission>,
    metrics: Option<Arc<RpcMetrics>>,
}

impl<E: Endpoint> ResponderBuilder<E> {
    pub fn config(mut self, cfg: ResponderConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Route-permission predicate. Takes precedence over `route_allowlist`.
    pub fn permission(mut self, permission: Permission) -> Self {
        self.permission = Some(permission);
        self
    }

    pub fn metrics(mut self, metrics: Arc<RpcMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<Responder> {
        let cfg = self.cfg;
        cfg.validate()?;

        let policy = InboundPolicy::new(cfg.max_payload_bytes);
        let policy = match self.permission {
            Some(p) => policy.with_permission(p),
            None => policy.with_allowlist(&cfg.route_allowlist)?,
        };
        let id = cfg.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

        let inner = Arc::new(Inner {
            me: Identity::new(id, cfg.bus.clone()),
            accept_unaddressed: cfg.accept_unaddressed,
            policy,
            endpoint: Arc::new(self.endpoint),
            routes: RwLock::new(Vec::new()),
            in_flight: DashMap::new(),
            seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            metrics: self.metrics.unwrap_or_default(),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        inner.endpoint.set_inbound(Some(Arc::new(move |raw| {
            if let Some(inner) = weak.upgrade() {
                Inner::on_message(&inner, raw);
            }
        })));

        if cfg.auto_start {
            inner.endpoint.start()?;
        }
        tracing::debug!(id = %inner.me.id, bus = ?inner.me.bus, policy = ?inner.policy, "responder ready");
        Ok(Responder { inner })
    }
}

impl Responder {
    pub fn new(endpoint: impl Endpoint, cfg: ResponderConfig) -> Result<Self> {
        Self::builder(endpoint).config(cfg).build()
    }

    pub fn builder<E: Endpoint>(endpoint: E) -> ResponderBuilder<E> {
        ResponderBuilder {
            endpoint,
            cfg: ResponderConfig::default(),
            permission: None,
            metrics: None,
        }
    }

    /// Append a route. Registration order decides priority.
    pub fn register_route(&self, route: impl IntoRoute, handler: impl Handler) -> Result<()> {
        if self.is_closed() {
            return Err(WireError::Closed);
        }
        let route = route.into_route()?;
        tracing::debug!(route = %route, "route registered");
        let mut routes = self
            .inner
            .routes
            .write()
            .map_err(|_| WireError::Internal("route table poisoned".into()))?;
        routes.push((route, Arc::new(handler)));
        Ok(())
    }

    /// Begin receiving requests (only needed with `auto_start: false`).
    pub fn start(&self) -> Result<()> {
        self.inner.endpoint.start()
    }

    pub fn id(&self) -> &str {
        &self.inner.me.id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Registered descriptors, in priority order.
    pub fn routes(&self) -> Vec<String> {
        self.inner
            .routes
            .read()
            .map(|r| r.iter().map(|(d, _)| d.as_str().to_owned()).collect())
            .unwrap_or_default()
    }

    /// Handlers currently executing.
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.len()
    }

    pub fn metrics(&self) -> &Arc<RpcMetrics> {
        &self.inner.metrics
    }

    /// Shut down: drop the route table, signal every running handler, and
    /// release the transport. Running handlers are not awaited; their replies
    /// are discarded. Idempotent.
    pub fn stop(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        inner.endpoint.set_inbound(None);
        if let Ok(mut routes) = inner.routes.write() {
            routes.clear();
        }

        let aborted = inner.in_flight.len();
        for entry in inner.in_flight.iter() {
            entry.value().token.cancel();
        }
        inner.in_flight.clear();
        inner.endpoint.close();
        tracing::info!(id = %inner.me.id, aborted, "responder stopped");
    }
}

impl Inner {
    fn on_message(self: &Arc<Self>, raw: Value) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let env = match decode(raw) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(error = %e, "inbound message dropped");
                self.metrics.dropped.inc(&[("reason", "malformed")]);
                return;
            }
        };

        match env {
            Envelope::Request(req) => self.on_request(req),
            Envelope::Cancel(c) => {
                if !accepts(&self.me, &c.addr, self.accept_unaddressed) {
                    return;
                }
                // unknown ids are a no-op: already settled or never ours
                if let Some(entry) = self.in_flight.get(&c.id) {
                    tracing::debug!(id = %c.id, "cancel received");
                    entry.token.cancel();
                }
            }
            // responses on a shared medium belong to requesters
            Envelope::Response(_) => {}
        }
    }

    fn on_request(self: &Arc<Self>, req: RequestEnvelope) {
        if !accepts(&self.me, &req.addr, self.accept_unaddressed) {
            tracing::trace!(id = %req.id, "request not addressed to us");
            self.metrics.dropped.inc(&[("reason", "addressing")]);
            return;
        }

        if let PolicyDecision::Reject(err) = self.policy.check(&req.route, &req.payload) {
            tracing::debug!(id = %req.id, route = %req.route, code = %err.code, "request rejected by policy");
            self.reply(&req.id, &req.addr, Err(err));
            return;
        }

        let found = self.routes.read().ok().and_then(|routes| {
            first_match(routes.iter(), &req.route)
                .map(|(d, h, params)| (d.as_str().to_owned(), Arc::clone(h), params))
        });
        let Some((matched, handler, params)) = found else {
            self.reply(&req.id, &req.addr, Err(RpcError::route_not_found(&req.route)));
            return;
        };

        let token = CancellationToken::new();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        if let Some(prev) = self.in_flight.insert(
            req.id.clone(),
            InFlight {
                seq,
                token: token.clone(),
            },
        ) {
            tracing::warn!(id = %req.id, prev_seq = prev.seq, "duplicate request id while in flight");
        }

        let rt = match tokio::runtime::Handle::try_current() {
            Ok(rt) => rt,
            Err(_) => {
                self.in_flight.remove_if(&req.id, |_, v| v.seq == seq);
                let err = RpcError::new(ErrorCode::InternalError, "no runtime to run handler")
                    .with_route(req.route.as_str());
                self.reply(&req.id, &req.addr, Err(err));
                return;
            }
        };

        let ctx = RequestCtx {
            id: req.id.clone(),
            route: req.route.clone(),
            matched,
            params,
            token,
            source: req.addr.source.clone(),
        };
        let span = tracing::debug_span!("rpc", id = %req.id, route = %req.route);
        let this = Arc::clone(self);
        rt.spawn(async move { this.execute(req, handler, ctx, seq).await }.instrument(span));
    }

    async fn execute(&self, req: RequestEnvelope, handler: Arc<dyn Handler>, ctx: RequestCtx, seq: u64) {
        let matched = ctx.matched.clone();
        self.metrics.handlers_active.inc(&[]);
        let started = Instant::now();

        let settled = AssertUnwindSafe(handler.handle(req.payload, ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(Failure::Panic(panic_message(panic.as_ref()))));

        self.metrics.handlers_active.dec(&[]);
        self.metrics
            .handler_duration
            .observe(&[("route", matched.as_str())], started.elapsed());

        let outcome = settled.map_err(|failure| {
            match &failure {
                Failure::Panic(_) => tracing::warn!(error = %failure, "handler panicked"),
                _ => tracing::debug!(error = %failure, "handler failed"),
            }
            map_error(failure, &req.route)
        });

        // a later Cancel for this id must find nothing
        self.in_flight.remove_if(&req.id, |_, v| v.seq == seq);
        self.reply(&req.id, &req.addr, outcome);
    }

    fn reply(&self, id: &str, to: &Addressing, outcome: std::result::Result<Value, RpcError>) {
        self.metrics.dispatches.inc(&[("outcome", outcome_label(&outcome))]);
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!(%id, "responder stopped, reply discarded");
            return;
        }

        let addr = Addressing::new(
            Some(&self.me.id),
            to.source.as_deref(),
            to.bus.as_deref().or(self.me.bus()),
        );
        let resp = match outcome {
            Ok(result) => ResponseEnvelope::success(id, result, addr),
            Err(err) => ResponseEnvelope::failure(id, err, addr),
        };
        if let Err(e) = self.endpoint.send(&Envelope::Response(resp)) {
            tracing::warn!(%id, error = %e, "reply send failed");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> Option<String> {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
}
