//! Envelope wire format (JSON).
//!
//! Every envelope carries the protocol version `v` and a `kind` tag. Addressing
//! fields are flattened into the top-level object and omitted when absent.
//!
//! ```json
//! {"v":1,"kind":"request","id":"..","route":"/users/42","payload":{},"source":"c1"}
//! {"v":1,"kind":"response","id":"..","ok":true,"result":{},"target":"c1"}
//! {"v":1,"kind":"cancel","id":".."}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RpcError, WireError};

/// Current protocol version. Envelopes carrying another version are ignored.
pub const PROTOCOL_VERSION: u8 = 1;

/// Optional multi-party addressing fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addressing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus: Option<String>,
}

impl Addressing {
    pub fn new(source: Option<&str>, target: Option<&str>, bus: Option<&str>) -> Self {
        Self {
            source: source.map(str::to_owned),
            target: target.map(str::to_owned),
            bus: bus.map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub v: u8,
    pub id: String,
    pub route: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(flatten)]
    pub addr: Addressing,
}

/// Response envelope. `ok` discriminates between `result` and `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u8,
    pub id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    #[serde(flatten)]
    pub addr: Addressing,
}

impl ResponseEnvelope {
    pub fn success(id: impl Into<String>, result: Value, addr: Addressing) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            id: id.into(),
            ok: true,
            result: Some(result),
            error: None,
            addr,
        }
    }

    pub fn failure(id: impl Into<String>, error: RpcError, addr: Addressing) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            id: id.into(),
            ok: false,
            result: None,
            error: Some(error),
            addr,
        }
    }

    /// Collapse into the call outcome. A missing result reads as `null`.
    pub fn into_outcome(self) -> std::result::Result<Value, RpcError> {
        if self.ok {
            return Ok(self.result.unwrap_or(Value::Null));
        }
        match self.error {
            Some(e) => Err(e.with_request_id(self.id)),
            None => Err(RpcError::new(
                crate::error::ErrorCode::InvalidMessage,
                "failure response without error record",
            )
            .with_request_id(self.id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelEnvelope {
    pub v: u8,
    pub id: String,
    #[serde(flatten)]
    pub addr: Addressing,
}

impl CancelEnvelope {
    pub fn new(id: impl Into<String>, addr: Addressing) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            id: id.into(),
            addr,
        }
    }
}

/// The unit exchanged over the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Envelope {
    Request(RequestEnvelope),
    Response(ResponseEnvelope),
    Cancel(CancelEnvelope),
}

impl Envelope {
    pub fn id(&self) -> &str {
        match self {
            Envelope::Request(r) => &r.id,
            Envelope::Response(r) => &r.id,
            Envelope::Cancel(c) => &c.id,
        }
    }

    pub fn addressing(&self) -> &Addressing {
        match self {
            Envelope::Request(r) => &r.addr,
            Envelope::Response(r) => &r.addr,
            Envelope::Cancel(c) => &c.addr,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Request(_) => "request",
            Envelope::Response(_) => "response",
            Envelope::Cancel(_) => "cancel",
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Decode a raw inbound value into an envelope.
///
/// The version is checked before the body so that future envelope shapes are
/// reported as [`WireError::UnsupportedVersion`] rather than as malformed.
pub fn decode(raw: Value) -> Result<Envelope> {
    let obj = raw
        .as_object()
        .ok_or_else(|| WireError::BadRequest("envelope must be a JSON object".into()))?;

    let v = obj
        .get("v")
        .and_then(Value::as_u64)
        .ok_or_else(|| WireError::BadRequest("missing protocol version".into()))?;
    if v != u64::from(PROTOCOL_VERSION) {
        return Err(WireError::UnsupportedVersion(v));
    }

    let env: Envelope = serde_json::from_value(raw)?;
    if env.id().is_empty() {
        return Err(WireError::BadRequest("empty envelope id".into()));
    }
    Ok(env)
}
