//! In-process broadcast medium.
//!
//! Every endpoint attached to a [`MemoryBus`] receives every message sent by
//! any *other* endpoint. Each delivery runs on its own spawned task, so the
//! bus gives no ordering guarantee between messages.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;

use wirecall_core::error::{Result, WireError};
use wirecall_core::Envelope;

use super::{Endpoint, InboundFn};

#[derive(Default)]
struct Member {
    inbound: RwLock<Option<InboundFn>>,
    started: AtomicBool,
    closed: AtomicBool,
}

impl Member {
    fn inbound(&self) -> Option<InboundFn> {
        // Poisoned lock means a callback panicked mid-swap; treat as detached.
        self.inbound.read().ok().and_then(|g| g.clone())
    }

    fn live(&self) -> bool {
        self.started.load(Ordering::Acquire) && !self.closed.load(Ordering::Acquire)
    }
}

#[derive(Default)]
struct BusInner {
    members: DashMap<u64, Arc<Member>>,
    monitors: DashMap<u64, mpsc::UnboundedSender<Value>>,
    seq: AtomicU64,
}

/// Shared broadcast medium. Cheap to clone.
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<BusInner>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two endpoints on a private bus: a bidirectional channel.
    pub fn pair() -> (MemoryEndpoint, MemoryEndpoint) {
        let bus = Self::new();
        (bus.endpoint(), bus.endpoint())
    }

    /// Attach a new endpoint.
    pub fn endpoint(&self) -> MemoryEndpoint {
        let key = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        let member = Arc::new(Member::default());
        self.inner.members.insert(key, Arc::clone(&member));
        MemoryEndpoint {
            key,
            bus: self.clone(),
            member,
            fail_sends: Arc::new(AtomicBool::new(false)),
            sent: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Copy of every message sent on the bus, in send order.
    pub fn monitor(&self) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        let key = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        self.inner.monitors.insert(key, tx);
        rx
    }

    pub fn endpoint_count(&self) -> usize {
        self.inner.members.len()
    }

    fn broadcast(&self, from: u64, value: Value) -> Result<()> {
        let rt = tokio::runtime::Handle::try_current()
            .map_err(|_| WireError::Transport("memory bus needs a tokio runtime".into()))?;

        self.inner
            .monitors
            .retain(|_, tx| tx.send(value.clone()).is_ok());

        for entry in self.inner.members.iter() {
            if *entry.key() == from {
                continue;
            }
            let member = Arc::clone(entry.value());
            let value = value.clone();
            rt.spawn(async move {
                // looked up at delivery time: a detached receiver gets nothing
                if !member.live() {
                    return;
                }
                if let Some(f) = member.inbound() {
                    f(value);
                }
            });
        }
        Ok(())
    }
}

/// One party on a [`MemoryBus`].
#[derive(Clone)]
pub struct MemoryEndpoint {
    key: u64,
    bus: MemoryBus,
    member: Arc<Member>,
    fail_sends: Arc<AtomicBool>,
    sent: Arc<AtomicU64>,
}

impl MemoryEndpoint {
    /// Make every following `send` fail synchronously (or stop doing so).
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Release);
    }

    /// Number of envelopes accepted by `send`.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.member.closed.load(Ordering::Acquire)
    }

    pub fn bus(&self) -> &MemoryBus {
        &self.bus
    }
}

impl Endpoint for MemoryEndpoint {
    fn send(&self, env: &Envelope) -> Result<()> {
        if self.is_closed() {
            return Err(WireError::Transport("endpoint closed".into()));
        }
        if self.fail_sends.load(Ordering::Acquire) {
            return Err(WireError::Transport("send refused".into()));
        }
        let value = env.to_value()?;
        self.bus.broadcast(self.key, value)?;
        self.sent.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn set_inbound(&self, f: Option<InboundFn>) {
        if let Ok(mut slot) = self.member.inbound.write() {
            *slot = f;
        }
    }

    fn start(&self) -> Result<()> {
        if self.is_closed() {
            return Err(WireError::Closed);
        }
        self.member.started.store(true, Ordering::Release);
        Ok(())
    }

    fn close(&self) {
        if self.member.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.set_inbound(None);
        self.bus.inner.members.remove(&self.key);
    }
}
