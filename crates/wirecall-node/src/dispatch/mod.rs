//! Serving side: handler contract and the dispatch engine.

pub mod handler;
pub mod responder;

pub use handler::{from_sync, handler_fn, Handler, HandlerResult, RequestCtx, SyncHandler};
pub use responder::{Responder, ResponderBuilder};
