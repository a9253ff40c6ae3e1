//! WebSocket hub endpoint.
//!
//! All connected peers form one broadcast medium:
//! - inbound text frames are parsed once and handed to the hub's receiver
//! - `send` fans the encoded envelope out to every connected peer
//!
//! Addressing in the envelopes decides who acts on what; the hub itself never
//! routes. Per-peer lifecycle: frame ceiling, ping interval, idle timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, State},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use wirecall_core::error::{Result, WireError};
use wirecall_core::Envelope;

use crate::app_state::AppState;
use crate::config::schema::GatewaySection;
use crate::transport::codec::{decode, encode, frame_len, Inbound};
use crate::transport::peers::{PeerConn, PeerRegistry};
use crate::transport::{Endpoint, InboundFn};

const PEER_QUEUE: usize = 1024;

#[derive(Default)]
struct HubInner {
    peers: PeerRegistry,
    inbound: RwLock<Option<InboundFn>>,
    started: AtomicBool,
    closed: AtomicBool,
}

/// Broadcast endpoint over every connected WebSocket peer. Cheap to clone.
#[derive(Clone, Default)]
pub struct WsHub {
    inner: Arc<HubInner>,
}

impl WsHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer_count(&self) -> usize {
        self.inner.peers.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Hand one inbound value to the receiver, if started and attached.
    fn deliver(&self, value: serde_json::Value) {
        if !self.inner.started.load(Ordering::Acquire) || self.is_closed() {
            return;
        }
        let f = self.inner.inbound.read().ok().and_then(|g| g.clone());
        if let Some(f) = f {
            f(value);
        }
    }
}

impl Endpoint for WsHub {
    fn send(&self, env: &Envelope) -> Result<()> {
        if self.is_closed() {
            return Err(WireError::Transport("hub closed".into()));
        }
        let msg = encode(env)?;
        let out = self.inner.peers.broadcast(&msg);
        if out.dropped > 0 {
            tracing::debug!(dropped = out.dropped, id = %env.id(), "peer queue full, envelope dropped");
        }
        Ok(())
    }

    fn set_inbound(&self, f: Option<InboundFn>) {
        if let Ok(mut slot) = self.inner.inbound.write() {
            *slot = f;
        }
    }

    fn start(&self) -> Result<()> {
        if self.is_closed() {
            return Err(WireError::Closed);
        }
        self.inner.started.store(true, Ordering::Release);
        Ok(())
    }

    fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.set_inbound(None);
        // peer loops notice `closed` on their next idle tick
        self.inner.peers.clear();
    }
}

// --------------------
// Entry
// --------------------
pub async fn ws_upgrade(State(app): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let max_frame = app.cfg().gateway.max_frame_bytes;
    ws.max_message_size(max_frame)
        .on_upgrade(move |socket| async move {
            if let Err(e) = run_peer(app, socket).await {
                tracing::debug!(error = %e, "peer session ended with error");
            }
        })
}

// --------------------
// Peer loop
// --------------------
async fn run_peer(app: AppState, socket: WebSocket) -> Result<()> {
    let hub = app.hub();
    if hub.is_closed() {
        return Err(WireError::Closed);
    }

    let (out_tx, mut out_rx) = mpsc::channel::<Message>(PEER_QUEUE);
    let key = hub.inner.peers.insert(PeerConn { tx: out_tx.clone() });
    app.metrics().peers_active.inc(&[]);
    tracing::info!(peer = key, "peer connected");

    let res = peer_loop(&hub, &app.cfg().gateway, socket, &out_tx, &mut out_rx).await;

    hub.inner.peers.remove(key);
    app.metrics().peers_active.dec(&[]);
    tracing::info!(peer = key, "peer disconnected");
    res
}

async fn peer_loop(
    hub: &WsHub,
    gw: &GatewaySection,
    socket: WebSocket,
    out_tx: &mpsc::Sender<Message>,
    out_rx: &mut mpsc::Receiver<Message>,
) -> Result<()> {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let ping_every = Duration::from_millis(gw.ping_interval_ms);
    let idle_timeout = Duration::from_millis(gw.idle_timeout_ms);
    let mut ping_tick = tokio::time::interval(ping_every);
    ping_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            // outbound writer
            maybe_out = out_rx.recv() => {
                match maybe_out {
                    Some(m) => {
                        if ws_tx.send(m).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // inbound reader
            incoming = ws_rx.next() => {
                let Some(incoming) = incoming else { break; };
                let Ok(msg) = incoming else { break; };
                last_activity = Instant::now();

                // size first, before any parsing
                if frame_len(&msg) > gw.max_frame_bytes {
                    tracing::debug!(len = frame_len(&msg), "frame over ceiling, closing peer");
                    break;
                }

                match decode(msg) {
                    Ok(Inbound::Json { value, .. }) => hub.deliver(value),
                    Ok(Inbound::Binary { bytes_len }) => {
                        tracing::debug!(bytes_len, "binary frame ignored");
                    }
                    Ok(Inbound::Ping(payload)) => {
                        let _ = out_tx.try_send(Message::Pong(payload));
                    }
                    Ok(Inbound::Pong(_)) => {}
                    Ok(Inbound::Close) => break,
                    // malformed frames are never fatal
                    Err(e) => tracing::debug!(error = %e, "undecodable frame dropped"),
                }
            }

            // ping
            _ = ping_tick.tick() => {
                let _ = out_tx.try_send(Message::Ping(Vec::new()));
            }

            // idle timeout / hub shutdown
            _ = tokio::time::sleep(Duration::from_millis(250)) => {
                if hub.is_closed() {
                    break;
                }
                if last_activity.elapsed() >= idle_timeout {
                    tracing::debug!("idle timeout");
                    break;
                }
            }
        }
    }

    let _ = ws_tx.close().await;
    Ok(())
}
