//! Registry of connected WebSocket peers.
//!
//! `peer_key -> outbound queue`. Keys are assigned from a monotonic sequence so
//! the oldest peer is always the one with the smallest key.

use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;

/// One peer's outbound queue sender.
#[derive(Clone)]
pub struct PeerConn {
    pub tx: mpsc::Sender<Message>,
}

#[derive(Default)]
pub struct PeerRegistry {
    peers: DashMap<u64, PeerConn>,
    seq: AtomicU64,
}

/// Outcome of a fan-out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    pub dropped: usize,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, conn: PeerConn) -> u64 {
        let key = self.seq.fetch_add(1, Ordering::Relaxed);
        self.peers.insert(key, conn);
        key
    }

    pub fn remove(&self, key: u64) -> Option<PeerConn> {
        self.peers.remove(&key).map(|(_, c)| c)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Lossy fan-out: `try_send` only; a full queue drops the message for that peer.
    pub fn broadcast(&self, msg: &Message) -> FanOut {
        let mut out = FanOut::default();
        for p in self.peers.iter() {
            match p.value().tx.try_send(msg.clone()) {
                Ok(()) => out.delivered += 1,
                Err(_) => out.dropped += 1,
            }
        }
        out
    }

    pub fn clear(&self) {
        self.peers.clear();
    }
}
