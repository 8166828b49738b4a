//! Frames exchanged between a hub and its WebSocket clients.
//!
//! Every frame is one binary WebSocket message encoded with
//! [`BincodeEncoder`].  Payloads inside `Request`/`Reply` are opaque bytes
//! produced by whichever encoder the caller chose.

use serde::{Deserialize, Serialize};
use tm_domain::{Error, Result};

use crate::encoder::{BincodeEncoder, Encoder};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BusFrame {
    /// Client → Hub: first frame on a new socket.
    Hello { client_name: String, protocol_version: u32 },

    /// Hub → Client: handshake accepted.
    Welcome { session_id: String, hub_version: String, protocol_version: u32 },

    /// Client → Hub: become the responder for `topic`.
    Subscribe { request_id: u64, topic: String },

    /// Client → Hub: stop responding on `topic`.
    Unsubscribe { topic: String },

    /// Hub → Client: outcome of a `Subscribe`.
    Ack { request_id: u64, ok: bool, error: Option<String> },

    /// Either direction: a request on `topic`.  The receiver answers with a
    /// `Reply` carrying the same `request_id`.
    Request { request_id: u64, topic: String, payload: Vec<u8>, timeout_ms: u64 },

    /// Either direction: answer to a `Request`.
    Reply { request_id: u64, payload: Option<Vec<u8>>, error: Option<ReplyError> },

    Ping { timestamp: i64 },
    Pong { timestamp: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyErrorKind {
    Timeout,
    NoResponders,
    Bus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyError {
    pub kind: ReplyErrorKind,
    pub message: String,
}

impl ReplyError {
    /// Map a local transport error onto the wire.
    pub fn from_error(e: &Error) -> Self {
        let kind = match e {
            Error::Timeout(_) => ReplyErrorKind::Timeout,
            Error::NoResponders(_) => ReplyErrorKind::NoResponders,
            _ => ReplyErrorKind::Bus,
        };
        let message = match e {
            Error::Timeout(m) | Error::NoResponders(m) | Error::Bus(m) => m.clone(),
            other => other.to_string(),
        };
        Self { kind, message }
    }

    pub fn into_error(self) -> Error {
        match self.kind {
            ReplyErrorKind::Timeout => Error::Timeout(self.message),
            ReplyErrorKind::NoResponders => Error::NoResponders(self.message),
            ReplyErrorKind::Bus => Error::Bus(self.message),
        }
    }
}

impl BusFrame {
    pub fn encode(&self) -> Result<Vec<u8>> {
        BincodeEncoder.encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        BincodeEncoder.decode(bytes)
    }
}
