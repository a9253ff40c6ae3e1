//! Top-level facade crate for wirecall.
//!
//! Re-exports the protocol core and the node runtime so users can depend on a single crate.

pub mod core {
    pub use wirecall_core::*;
}

pub mod node {
    pub use wirecall_node::*;
}

pub use wirecall_core::{ErrorCode, Failure, RpcError};
pub use wirecall_node::{
    from_sync, handler_fn, CallOptions, Endpoint, Handler, HandlerResult, MemoryBus, RequestCtx, Requester,
    Responder,
};
