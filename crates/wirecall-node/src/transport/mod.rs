//! Transport layer.
//!
//! [`Endpoint`] is the only thing requesters and responders know about the
//! medium underneath them: a fire-and-forget `send`, a receive-callback slot,
//! and `start`/`close`. Two adapters ship here:
//! - [`memory::MemoryBus`]: in-process broadcast medium (tests, embedding).
//! - [`ws::WsHub`]: every connected WebSocket peer folded into one medium.

pub mod codec;
pub mod memory;
pub mod peers;
pub mod ws;

use std::sync::Arc;

use serde_json::Value;

use wirecall_core::error::Result;
use wirecall_core::Envelope;

pub use memory::{MemoryBus, MemoryEndpoint};
pub use ws::WsHub;

/// Receive callback. Invoked once per inbound message with the raw decoded
/// value; validating it is the caller's job.
pub type InboundFn = Arc<dyn Fn(Value) + Send + Sync>;

/// Send/receive primitive shared by requesters and responders.
pub trait Endpoint: Send + Sync + 'static {
    /// Fire-and-forget send. Errors are synchronous only; there is no
    /// delivery acknowledgement.
    fn send(&self, env: &Envelope) -> Result<()>;

    /// Install (or with `None`, detach) the receive callback.
    fn set_inbound(&self, f: Option<InboundFn>);

    /// Begin delivering inbound messages.
    fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Release the underlying resource. Idempotent.
    fn close(&self);
}

impl<E: Endpoint + ?Sized> Endpoint for Arc<E> {
    fn send(&self, env: &Envelope) -> Result<()> {
        (**self).send(env)
    }

    fn set_inbound(&self, f: Option<InboundFn>) {
        (**self).set_inbound(f)
    }

    fn start(&self) -> Result<()> {
        (**self).start()
    }

    fn close(&self) {
        (**self).close()
    }
}
