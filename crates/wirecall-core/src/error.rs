//! Shared error types across wirecall crates.
//!
//! Two layers:
//! - [`RpcError`]: the structured error record carried inside Response
//!   envelopes and returned from calls. Its [`ErrorCode`] is a closed set.
//! - [`WireError`]: crate-level failures (config, codec, transport plumbing).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Closed error taxonomy (stable wire API).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No registered route matched the request path.
    RouteNotFound,
    /// No response arrived before the deadline.
    Timeout,
    /// Handler failure or unclassified error.
    InternalError,
    /// Malformed envelope or route descriptor.
    InvalidMessage,
    /// Serialized payload exceeds the configured ceiling.
    PayloadTooLarge,
    /// Route rejected by the permission predicate.
    Forbidden,
    /// Requester was shut down.
    ClientClosed,
    /// Caller aborted the request.
    Cancelled,
    /// Transport refused to send.
    TransportError,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 9] = [
        ErrorCode::RouteNotFound,
        ErrorCode::Timeout,
        ErrorCode::InternalError,
        ErrorCode::InvalidMessage,
        ErrorCode::PayloadTooLarge,
        ErrorCode::Forbidden,
        ErrorCode::ClientClosed,
        ErrorCode::Cancelled,
        ErrorCode::TransportError,
    ];

    /// String representation used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::RouteNotFound => "ROUTE_NOT_FOUND",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::InvalidMessage => "INVALID_MESSAGE",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::ClientClosed => "CLIENT_CLOSED",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::TransportError => "TRANSPORT_ERROR",
        }
    }

    /// Parse a wire code. Unknown strings yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    /// Retriability when the failure does not say otherwise.
    pub fn default_retriable(self) -> bool {
        matches!(self, ErrorCode::Timeout | ErrorCode::TransportError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error record exchanged in Response envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct RpcError {
    #[serde(deserialize_with = "lenient_code")]
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(default)]
    pub retriable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Id of the request this error settled. Local only, never on the wire.
    #[serde(skip)]
    pub request_id: Option<String>,
}

impl RpcError {
    /// New record with the code's default retriability.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            route: None,
            retriable: code.default_retriable(),
            details: None,
            request_id: None,
        }
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn with_retriable(mut self, retriable: bool) -> Self {
        self.retriable = retriable;
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn route_not_found(route: &str) -> Self {
        Self::new(ErrorCode::RouteNotFound, format!("no route matches {route}")).with_route(route)
    }

    pub fn timeout(route: &str, after_ms: u128) -> Self {
        Self::new(ErrorCode::Timeout, format!("request timed out after {after_ms}ms"))
            .with_route(route)
            .with_retriable(true)
    }

    pub fn cancelled(route: &str) -> Self {
        Self::new(ErrorCode::Cancelled, "request cancelled")
            .with_route(route)
            .with_retriable(false)
    }

    pub fn client_closed() -> Self {
        Self::new(ErrorCode::ClientClosed, "requester is closed").with_retriable(false)
    }

    pub fn payload_too_large(size: usize, limit: usize) -> Self {
        Self::new(
            ErrorCode::PayloadTooLarge,
            format!("payload is {size} bytes, limit is {limit}"),
        )
        .with_retriable(false)
    }

    pub fn forbidden(route: &str) -> Self {
        Self::new(ErrorCode::Forbidden, format!("route not permitted: {route}"))
            .with_route(route)
            .with_retriable(false)
    }

    pub fn transport(route: &str, cause: impl fmt::Display) -> Self {
        Self::new(ErrorCode::TransportError, format!("send failed: {cause}"))
            .with_route(route)
            .with_retriable(true)
    }
}

// Foreign peers may send codes outside the closed set; fold them into INTERNAL_ERROR.
fn lenient_code<'de, D>(d: D) -> std::result::Result<ErrorCode, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(d)?;
    Ok(ErrorCode::parse(&raw).unwrap_or(ErrorCode::InternalError))
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, WireError>;

/// Unified crate-level error used by core and node.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("invalid route: {0}")]
    InvalidRoute(String),
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u64),
    #[error("payload too large: {size} > {limit}")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("transport: {0}")]
    Transport(String),
    #[error("closed")]
    Closed,
    #[error("internal: {0}")]
    Internal(String),
}

impl WireError {
    /// Map an internal error to a stable wire code.
    pub fn client_code(&self) -> ErrorCode {
        match self {
            WireError::BadRequest(_) => ErrorCode::InvalidMessage,
            WireError::InvalidRoute(_) => ErrorCode::InvalidMessage,
            WireError::UnsupportedVersion(_) => ErrorCode::InvalidMessage,
            WireError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            WireError::Transport(_) => ErrorCode::TransportError,
            WireError::Closed => ErrorCode::ClientClosed,
            WireError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Convert into a structured record (non-retriable unless the code says so).
    pub fn into_rpc(self) -> RpcError {
        let code = self.client_code();
        match self {
            WireError::PayloadTooLarge { size, limit } => RpcError::payload_too_large(size, limit),
            WireError::Closed => RpcError::client_closed(),
            other => RpcError::new(code, other.to_string()),
        }
    }
}

impl From<serde_json::Error> for WireError {
    fn from(e: serde_json::Error) -> Self {
        WireError::BadRequest(format!("json: {e}"))
    }
}
