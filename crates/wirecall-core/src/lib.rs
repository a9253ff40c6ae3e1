//! wirecall core: transport-agnostic protocol primitives, error types, and the
//! pure pieces of request routing.
//!
//! This crate defines the wire-level contracts shared by requesters and
//! responders: envelopes, the closed error taxonomy, the error mapper, the
//! route matcher, and the addressing filter. It carries no runtime or
//! transport dependencies so it can be reused in multiple contexts.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here.
//! All fallible paths surface as `WireError`/`Result` so that malformed
//! traffic never brings a process down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod addressing;
pub mod error;
pub mod mapper;
pub mod protocol;
pub mod route;

/// Shared result type.
pub use error::{ErrorCode, Result, RpcError, WireError};

pub use addressing::Identity;
pub use mapper::{map_error, Failure};
pub use protocol::envelope::{Addressing, Envelope, PROTOCOL_VERSION};
pub use route::{IntoRoute, Params, RouteDescriptor};
