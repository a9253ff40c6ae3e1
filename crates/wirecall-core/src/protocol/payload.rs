//! Payload value model helpers.
//!
//! Payloads are `serde_json::Value`s. Their size is the length of the compact
//! JSON encoding in bytes, which is what both sides compare against their
//! ceilings.

use serde_json::Value;

use crate::error::{Result, WireError};

/// Default payload ceiling (2 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 2 * 1024 * 1024;

/// Nesting limit for values accepted as error details.
pub const MAX_PLAIN_DEPTH: usize = 64;

/// Serialized size of a payload in bytes.
pub fn serialized_len(v: &Value) -> Result<usize> {
    serde_json::to_vec(v)
        .map(|b| b.len())
        .map_err(|e| WireError::BadRequest(format!("payload not serializable: {e}")))
}

/// Fail with [`WireError::PayloadTooLarge`] if `v` encodes to more than `limit` bytes.
pub fn check_size(v: &Value, limit: usize) -> Result<usize> {
    let size = serialized_len(v)?;
    if size > limit {
        return Err(WireError::PayloadTooLarge { size, limit });
    }
    Ok(size)
}

/// Whether `v` stays inside the restricted value model: primitives, arrays and
/// string-keyed maps, nested no deeper than [`MAX_PLAIN_DEPTH`].
pub fn is_plain(v: &Value) -> bool {
    fn walk(v: &Value, depth: usize) -> bool {
        if depth > MAX_PLAIN_DEPTH {
            return false;
        }
        match v {
            Value::Null | Value::Bool(_) | Value::String(_) => true,
            // serde_json never holds NaN/inf, but arbitrary-precision builds can
            Value::Number(n) => n.as_f64().map_or(true, f64::is_finite),
            Value::Array(items) => items.iter().all(|i| walk(i, depth + 1)),
            Value::Object(map) => map.values().all(|i| walk(i, depth + 1)),
        }
    }
    walk(v, 0)
}
