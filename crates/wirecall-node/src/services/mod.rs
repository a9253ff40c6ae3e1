//! Built-in routes served by every node.

pub mod sys;

pub use sys::register_builtin;
