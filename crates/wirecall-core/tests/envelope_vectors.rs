//! Envelope decoder vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use serde::Deserialize;
use serde_json::Value;

use wirecall_core::protocol::envelope::decode;
use wirecall_core::{Envelope, ErrorCode, WireError};

mod vector_loader;

#[derive(Debug, Deserialize)]
struct Case {
    name: String,
    raw: Value,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    unsupported_version: bool,
}

#[test]
fn envelope_vectors() {
    let v = vector_loader::load::<Option<()>, Case>("envelopes.json");
    for c in v.cases {
        let res = decode(c.raw.clone());

        if let Some(code) = &c.error {
            let e = res.expect_err(&format!("expected error for {}", c.name));
            assert_eq!(e.client_code().as_str(), code, "case={}", c.name);
            assert_eq!(
                matches!(e, WireError::UnsupportedVersion(_)),
                c.unsupported_version,
                "case={}",
                c.name
            );
            continue;
        }

        let env = res.unwrap_or_else(|e| panic!("case={} failed: {e}", c.name));
        assert_eq!(Some(env.kind()), c.kind.as_deref(), "case={}", c.name);
        assert_eq!(env.id(), "r1", "case={}", c.name);
    }
}

#[test]
fn failure_response_carries_structured_error() {
    let raw = serde_json::json!({
        "v": 1, "kind": "response", "id": "r7", "ok": false, "target": "c1",
        "error": { "code": "ROUTE_NOT_FOUND", "message": "no route", "route": "/x" }
    });
    let Envelope::Response(resp) = decode(raw).unwrap() else {
        panic!("expected response");
    };
    assert_eq!(resp.addr.target.as_deref(), Some("c1"));
    let err = resp.into_outcome().unwrap_err();
    assert_eq!(err.code, ErrorCode::RouteNotFound);
    assert_eq!(err.route.as_deref(), Some("/x"));
    assert_eq!(err.request_id.as_deref(), Some("r7"));
    assert!(!err.retriable);
}
