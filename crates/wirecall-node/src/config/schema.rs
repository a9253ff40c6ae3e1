use std::time::Duration;

use serde::Deserialize;
use wirecall_core::error::{Result, WireError};
use wirecall_core::protocol::payload::DEFAULT_MAX_PAYLOAD_BYTES;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub requester: RequesterConfig,

    #[serde(default)]
    pub responder: ResponderConfig,
}

impl NodeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(WireError::UnsupportedVersion(u64::from(self.version)));
        }

        self.gateway.validate()?;
        self.requester.validate()?;
        self.responder.validate()?;

        if self.responder.max_payload_bytes > self.gateway.max_frame_bytes {
            tracing::warn!(
                payload = self.responder.max_payload_bytes,
                frame = self.gateway.max_frame_bytes,
                "responder payload ceiling exceeds gateway frame ceiling; frames will close first"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ping_interval_ms: default_ping_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if !(5000..=120000).contains(&self.ping_interval_ms) {
            return Err(WireError::BadRequest(
                "gateway.ping_interval_ms must be between 5000 and 120000".into(),
            ));
        }
        if !(10000..=600000).contains(&self.idle_timeout_ms) {
            return Err(WireError::BadRequest(
                "gateway.idle_timeout_ms must be between 10000 and 600000".into(),
            ));
        }
        if self.idle_timeout_ms <= self.ping_interval_ms {
            return Err(WireError::BadRequest(
                "gateway.idle_timeout_ms must be greater than ping_interval_ms".into(),
            ));
        }
        if self.max_frame_bytes == 0 {
            return Err(WireError::BadRequest("gateway.max_frame_bytes must be > 0".into()));
        }
        Ok(())
    }
}

/// Requester (calling side) settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequesterConfig {
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub auto_start: bool,

    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Own id; generated when absent.
    #[serde(default)]
    pub id: Option<String>,

    /// Fixed target id; absent means unaddressed sends.
    #[serde(default)]
    pub target: Option<String>,

    #[serde(default)]
    pub bus: Option<String>,
}

impl Default for RequesterConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            auto_start: true,
            max_payload_bytes: default_max_payload_bytes(),
            id: None,
            target: None,
            bus: None,
        }
    }
}

impl RequesterConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=3_600_000).contains(&self.default_timeout_ms) {
            return Err(WireError::BadRequest(
                "requester.default_timeout_ms must be between 1 and 3600000".into(),
            ));
        }
        if self.max_payload_bytes == 0 {
            return Err(WireError::BadRequest("requester.max_payload_bytes must be > 0".into()));
        }
        non_empty("requester.id", &self.id)?;
        non_empty("requester.target", &self.target)?;
        non_empty("requester.bus", &self.bus)?;
        Ok(())
    }
}

/// Responder (serving side) settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponderConfig {
    #[serde(default = "default_true")]
    pub auto_start: bool,

    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Own id; generated when absent.
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub bus: Option<String>,

    #[serde(default = "default_true")]
    pub accept_unaddressed: bool,

    /// Route permission rules (`/exact`, `/prefix/*`, `*`). Empty allows all.
    #[serde(default)]
    pub route_allowlist: Vec<String>,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            auto_start: true,
            max_payload_bytes: default_max_payload_bytes(),
            id: None,
            bus: None,
            accept_unaddressed: true,
            route_allowlist: Vec::new(),
        }
    }
}

impl ResponderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_payload_bytes == 0 {
            return Err(WireError::BadRequest("responder.max_payload_bytes must be > 0".into()));
        }
        non_empty("responder.id", &self.id)?;
        non_empty("responder.bus", &self.bus)?;
        crate::policy::allowlist::compile_route_rules(&self.route_allowlist)?;
        Ok(())
    }
}

fn non_empty(field: &str, v: &Option<String>) -> Result<()> {
    match v {
        Some(s) if s.is_empty() => Err(WireError::BadRequest(format!("{field} must not be empty"))),
        _ => Ok(()),
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_ping_interval_ms() -> u64 {
    20000
}
fn default_idle_timeout_ms() -> u64 {
    60000
}
fn default_max_frame_bytes() -> usize {
    4 * 1024 * 1024
}
fn default_timeout_ms() -> u64 {
    10000
}
fn default_max_payload_bytes() -> usize {
    DEFAULT_MAX_PAYLOAD_BYTES
}
fn default_true() -> bool {
    true
}
