use std::sync::Arc;

use serde_json::Value;

use wirecall_core::protocol::payload::serialized_len;
use wirecall_core::{ErrorCode, RpcError};

use super::allowlist::{compile_route_rules, is_route_allowed};

/// Route-permission predicate.
pub type Permission = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Decision from inbound policy evaluation.
#[derive(Debug, Clone)]
pub enum PolicyDecision {
    Pass,
    /// Reply with this error; the handler is not invoked.
    Reject(RpcError),
}

/// Responder-side inbound policy: permission predicate, then payload ceiling.
/// Construct once at startup.
#[derive(Clone)]
pub struct InboundPolicy {
    max_payload_bytes: usize,
    permission: Option<Permission>,
}

impl std::fmt::Debug for InboundPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundPolicy")
            .field("max_payload_bytes", &self.max_payload_bytes)
            .field("permission", &self.permission.is_some())
            .finish()
    }
}

impl InboundPolicy {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self {
            max_payload_bytes,
            permission: None,
        }
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permission = Some(permission);
        self
    }

    /// Compile config allowlist entries into the permission predicate.
    /// An empty list leaves every route permitted.
    pub fn with_allowlist(self, raw: &[String]) -> wirecall_core::Result<Self> {
        if raw.is_empty() {
            return Ok(self);
        }
        let rules = compile_route_rules(raw)?;
        Ok(self.with_permission(Arc::new(move |route| is_route_allowed(&rules, route))))
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    pub fn check_route(&self, route: &str) -> PolicyDecision {
        match &self.permission {
            Some(allow) if !allow(route) => PolicyDecision::Reject(RpcError::forbidden(route)),
            _ => PolicyDecision::Pass,
        }
    }

    pub fn check_len(&self, route: &str, bytes_len: usize) -> PolicyDecision {
        if bytes_len > self.max_payload_bytes {
            return PolicyDecision::Reject(
                RpcError::payload_too_large(bytes_len, self.max_payload_bytes).with_route(route),
            );
        }
        PolicyDecision::Pass
    }

    /// Full inbound check, permission first.
    pub fn check(&self, route: &str, payload: &Value) -> PolicyDecision {
        match self.check_route(route) {
            PolicyDecision::Pass => {}
            other => return other,
        }
        match serialized_len(payload) {
            Ok(len) => self.check_len(route, len),
            Err(e) => PolicyDecision::Reject(
                RpcError::new(ErrorCode::InvalidMessage, e.to_string())
                    .with_route(route)
                    .with_retriable(false),
            ),
        }
    }
}
