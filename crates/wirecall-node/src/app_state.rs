//! Shared application state for the wirecall node.
//!
//! Owns the WebSocket hub, the responder bound to it, and the metrics
//! registry. Startup errors surface as `Result` instead of panics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use wirecall_core::error::Result;

use crate::config::NodeConfig;
use crate::dispatch::Responder;
use crate::obs::RpcMetrics;
use crate::services;
use crate::transport::WsHub;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: NodeConfig,
    hub: WsHub,
    responder: Responder,
    metrics: Arc<RpcMetrics>,
    draining: AtomicBool,
}

impl AppState {
    /// Build the hub and responder and register the built-in routes.
    pub fn new(cfg: NodeConfig) -> Result<Self> {
        cfg.validate()?;

        let metrics = Arc::new(RpcMetrics::new());
        let hub = WsHub::new();
        let responder = Responder::builder(hub.clone())
            .config(cfg.responder.clone())
            .metrics(Arc::clone(&metrics))
            .build()?;

        services::register_builtin(&responder)?;
        tracing::info!(id = %responder.id(), routes = ?responder.routes(), "responder routes registered");

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                hub,
                responder,
                metrics,
                draining: AtomicBool::new(false),
            }),
        })
    }

    pub fn cfg(&self) -> &NodeConfig {
        &self.inner.cfg
    }

    pub fn hub(&self) -> WsHub {
        self.inner.hub.clone()
    }

    pub fn responder(&self) -> &Responder {
        &self.inner.responder
    }

    pub fn metrics(&self) -> Arc<RpcMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::Acquire)
    }

    /// Flip readiness off and stop serving. Idempotent.
    pub fn begin_drain(&self) {
        if self.inner.draining.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(in_flight = self.inner.responder.in_flight_count(), "draining");
        self.inner.responder.stop();
    }

    /// Point-in-time values appended to `/metrics`.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("wirecall_ws_peers", self.inner.hub.peer_count() as u64),
            ("wirecall_in_flight", self.inner.responder.in_flight_count() as u64),
            ("wirecall_draining", u64::from(self.is_draining())),
        ]
    }
}
