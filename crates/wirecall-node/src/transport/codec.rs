//! Decode-once codec between WebSocket frames and envelope values.
//!
//! - Text frames => raw JSON value (validated later by requester/responder)
//! - Binary frames are not part of the protocol and are surfaced as such
//! - Ping/Pong/Close are surfaced for lifecycle management

use axum::extract::ws::Message;
use serde_json::Value;

use wirecall_core::error::{Result, WireError};
use wirecall_core::Envelope;

#[derive(Debug)]
pub enum Inbound {
    Json { value: Value, bytes_len: usize },
    Binary { bytes_len: usize },
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// Cheap length of a frame, computed before any parsing.
pub fn frame_len(msg: &Message) -> usize {
    match msg {
        Message::Text(s) => s.len(),
        Message::Binary(b) => b.len(),
        Message::Ping(v) => v.len(),
        Message::Pong(v) => v.len(),
        Message::Close(_) => 0,
    }
}

pub fn decode(msg: Message) -> Result<Inbound> {
    match msg {
        Message::Text(s) => {
            let bytes_len = s.len();
            let value: Value = serde_json::from_str(&s)
                .map_err(|e| WireError::BadRequest(format!("invalid json frame: {e}")))?;
            Ok(Inbound::Json { value, bytes_len })
        }
        Message::Binary(b) => Ok(Inbound::Binary { bytes_len: b.len() }),
        Message::Ping(v) => Ok(Inbound::Ping(v)),
        Message::Pong(v) => Ok(Inbound::Pong(v)),
        Message::Close(_) => Ok(Inbound::Close),
    }
}

pub fn encode(env: &Envelope) -> Result<Message> {
    let s = serde_json::to_string(env)
        .map_err(|e| WireError::Internal(format!("envelope encode failed: {e}")))?;
    Ok(Message::Text(s))
}
