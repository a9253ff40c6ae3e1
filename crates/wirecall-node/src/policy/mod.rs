//! Policy layer (route permission, payload ceiling).
//!
//! Compiles responder configuration into the checks the dispatch engine runs
//! on every accepted request before a handler is invoked.

pub mod allowlist;
pub mod engine;

pub use engine::{InboundPolicy, Permission, PolicyDecision};
