//! wirecall node library entry.
//!
//! Runtime half of the RPC layer: the request correlator, the dispatch
//! engine, transport adapters, configuration, and the node's HTTP surface.
//! Consumed by the binary (`main.rs`) and by integration tests.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod app_state;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod obs;
pub mod ops;
pub mod policy;
pub mod router;
pub mod services;
pub mod transport;

pub use client::{CallOptions, CallResult, Requester};
pub use dispatch::{from_sync, handler_fn, Handler, HandlerResult, RequestCtx, Responder};
pub use transport::{Endpoint, MemoryBus, MemoryEndpoint, WsHub};
