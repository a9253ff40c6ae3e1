//! Error mapper: normalize whatever a handler failed with into an [`RpcError`].

use std::fmt;

use serde_json::Value;

use crate::error::{ErrorCode, RpcError, WireError};
use crate::protocol::payload::is_plain;

/// Message used when a failure carries no usable description.
pub const FALLBACK_MESSAGE: &str = "Unknown error";

/// A handler failure before normalization.
#[derive(Debug)]
pub enum Failure {
    /// Already-structured record.
    Rpc(RpcError),
    /// Arbitrary JSON value, e.g. `{"code": "FORBIDDEN", "message": "..."}`.
    Value(Value),
    /// Any other error. Its `Display` output becomes the message.
    Error(Box<dyn std::error::Error + Send + Sync>),
    /// The handler panicked. Carries the panic message when it was a string.
    Panic(Option<String>),
}

impl Failure {
    pub fn error<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Failure::Error(Box::new(e))
    }

    /// Structured failure with a code and message.
    pub fn coded(code: ErrorCode, message: impl Into<String>) -> Self {
        Failure::Rpc(RpcError::new(code, message))
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Rpc(e) => write!(f, "{e}"),
            Failure::Value(v) => write!(f, "{v}"),
            Failure::Error(e) => write!(f, "{e}"),
            Failure::Panic(Some(m)) => write!(f, "panic: {m}"),
            Failure::Panic(None) => f.write_str("panic"),
        }
    }
}

impl From<RpcError> for Failure {
    fn from(e: RpcError) -> Self {
        Failure::Rpc(e)
    }
}

impl From<Value> for Failure {
    fn from(v: Value) -> Self {
        Failure::Value(v)
    }
}

impl From<WireError> for Failure {
    fn from(e: WireError) -> Self {
        Failure::error(e)
    }
}

impl From<serde_json::Error> for Failure {
    fn from(e: serde_json::Error) -> Self {
        Failure::error(e)
    }
}

impl From<String> for Failure {
    fn from(s: String) -> Self {
        Failure::Value(Value::String(s))
    }
}

impl From<&str> for Failure {
    fn from(s: &str) -> Self {
        Failure::Value(Value::String(s.to_owned()))
    }
}

/// Normalize `raw` into a structured record stamped with `route`.
pub fn map_error(raw: Failure, route: &str) -> RpcError {
    let mut out = match raw {
        Failure::Rpc(e) => {
            let details = e.details.filter(is_plain);
            RpcError {
                code: e.code,
                message: non_empty(e.message),
                route: None,
                retriable: e.retriable,
                details,
                request_id: e.request_id,
            }
        }
        Failure::Value(v) => from_value(v),
        Failure::Error(e) => RpcError::new(ErrorCode::InternalError, non_empty(e.to_string())),
        Failure::Panic(msg) => RpcError::new(
            ErrorCode::InternalError,
            msg.map_or_else(|| FALLBACK_MESSAGE.to_owned(), |m| format!("handler panicked: {m}")),
        ),
    };
    out.route = Some(route.to_owned());
    out
}

fn from_value(v: Value) -> RpcError {
    let Value::Object(mut obj) = v else {
        let message = match v {
            Value::String(s) => non_empty(s),
            _ => FALLBACK_MESSAGE.to_owned(),
        };
        return RpcError::new(ErrorCode::InternalError, message);
    };

    let raw_code = obj.get("code").and_then(Value::as_str);
    let code = raw_code.and_then(ErrorCode::parse).unwrap_or_else(|| {
        if let Some(unknown) = raw_code {
            tracing::debug!(code = unknown, "unknown error code coerced to INTERNAL_ERROR");
        }
        ErrorCode::InternalError
    });

    let message = match obj.remove("message") {
        Some(Value::String(s)) => non_empty(s),
        _ => obj
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .map_or_else(|| FALLBACK_MESSAGE.to_owned(), non_empty),
    };

    let retriable = obj
        .get("retriable")
        .and_then(Value::as_bool)
        .unwrap_or_else(|| code.default_retriable());

    let details = obj.remove("details").filter(is_plain);

    RpcError {
        code,
        message,
        route: None,
        retriable,
        details,
        request_id: None,
    }
}

fn non_empty(s: String) -> String {
    if s.is_empty() {
        FALLBACK_MESSAGE.to_owned()
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn known_code_is_kept_and_route_overridden() {
        let e = map_error(
            json!({"code": "FORBIDDEN", "message": "nope", "route": "/elsewhere"}).into(),
            "/admin",
        );
        assert_eq!(e.code, ErrorCode::Forbidden);
        assert_eq!(e.message, "nope");
        assert_eq!(e.route.as_deref(), Some("/admin"));
        assert!(!e.retriable);
    }

    #[test]
    fn unknown_code_is_coerced() {
        let e = map_error(json!({"code": "E_WHATEVER", "message": "x"}).into(), "/a");
        assert_eq!(e.code, ErrorCode::InternalError);
    }

    #[test]
    fn retriable_defaults_follow_code_unless_explicit() {
        let t = map_error(json!({"code": "TIMEOUT"}).into(), "/a");
        assert!(t.retriable);
        assert_eq!(t.message, FALLBACK_MESSAGE);

        let t = map_error(json!({"code": "TIMEOUT", "retriable": false}).into(), "/a");
        assert!(!t.retriable);

        let f = map_error(json!({"code": "FORBIDDEN", "retriable": true}).into(), "/a");
        assert!(f.retriable);
    }

    #[test]
    fn plain_details_pass_through() {
        let e = map_error(
            json!({"code": "INVALID_MESSAGE", "details": {"field": "name", "hints": [1, 2]}}).into(),
            "/a",
        );
        assert_eq!(e.details, Some(json!({"field": "name", "hints": [1, 2]})));
    }

    #[test]
    fn generic_errors_use_their_description() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let e = map_error(Failure::error(io), "/disk");
        assert_eq!(e.code, ErrorCode::InternalError);
        assert_eq!(e.message, "disk on fire");
        assert!(!e.retriable);
    }

    #[test]
    fn non_object_values_fall_back() {
        assert_eq!(map_error("boom".into(), "/a").message, "boom");
        assert_eq!(map_error(json!(42).into(), "/a").message, FALLBACK_MESSAGE);
        assert_eq!(map_error(Failure::Panic(None), "/a").message, FALLBACK_MESSAGE);
    }

    #[test]
    fn structured_records_keep_explicit_retriable() {
        let raw = RpcError::new(ErrorCode::TransportError, "upstream gone").with_retriable(false);
        let e = map_error(raw.into(), "/proxy");
        assert_eq!(e.code, ErrorCode::TransportError);
        assert!(!e.retriable);
        assert_eq!(e.route.as_deref(), Some("/proxy"));
    }
}
