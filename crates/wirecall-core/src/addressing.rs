//! Addressing filter.
//!
//! Broadcast-style transports deliver every envelope to every party. The
//! filter decides whether an envelope is meant for a given identity, using the
//! optional `source` / `target` / `bus` fields.
//!
//! Bus scoping is strict in both directions: a bus-scoped party only accepts
//! envelopes on its own bus, and an unscoped party only accepts unscoped
//! envelopes.

use crate::protocol::envelope::Addressing;

/// Immutable identity of a requester or responder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub bus: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>, bus: Option<String>) -> Self {
        Self { id: id.into(), bus }
    }

    pub fn bus(&self) -> Option<&str> {
        self.bus.as_deref()
    }
}

/// Responder-side acceptance of an inbound request or cancel.
pub fn accepts(me: &Identity, msg: &Addressing, accept_unaddressed: bool) -> bool {
    if msg.source.as_deref() == Some(me.id.as_str()) {
        return false;
    }
    match msg.target.as_deref() {
        Some(target) if target != me.id => return false,
        Some(_) => {}
        None if !accept_unaddressed => return false,
        None => {}
    }
    bus_matches(me.bus(), msg.bus.as_deref())
}

/// Requester-side acceptance of an inbound response.
///
/// Mirror of [`accepts`]: the response must be addressed to us (or carry no
/// target), must not be our own echo, must come from `expected_source` when
/// the requester is pinned to a fixed target, and must pass the bus matrix.
pub fn accepts_response(me: &Identity, expected_source: Option<&str>, msg: &Addressing) -> bool {
    if !accepts(me, msg, true) {
        return false;
    }
    match expected_source {
        Some(expected) => msg.source.as_deref() == Some(expected),
        None => true,
    }
}

fn bus_matches(mine: Option<&str>, theirs: Option<&str>) -> bool {
    match (mine, theirs) {
        (Some(a), Some(b)) => a == b,
        (None, None) => true,
        _ => false,
    }
}
