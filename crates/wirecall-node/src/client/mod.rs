//! Calling side: the request correlator.

pub mod requester;

pub use requester::{CallOptions, CallResult, Requester};
