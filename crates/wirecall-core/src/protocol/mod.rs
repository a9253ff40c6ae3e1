//! Protocol modules.
//!
//! - `envelope`: JSON envelopes (request / response / cancel) and the decoder.
//! - `payload`: payload size accounting and the restricted value model.
//!
//! Decoding is panic-free: malformed input is reported as `WireError` so the
//! caller can drop it and keep serving.

pub mod envelope;
pub mod payload;
