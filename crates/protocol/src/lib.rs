//! Wire-level contracts shared by the hub, the registry and agents:
//! well-known topic names, the pluggable payload encoders, the registry
//! reply envelope, and the frames exchanged over a hub WebSocket.

pub mod encoder;
pub mod frame;
pub mod topics;

pub use encoder::{BincodeEncoder, Encoder, JsonEncoder};
pub use frame::{BusFrame, ReplyError, ReplyErrorKind};

use serde::{Deserialize, Serialize};

/// Bumped on any incompatible change to [`BusFrame`].
pub const PROTOCOL_VERSION: u32 = 1;

/// Answer to every registry control request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryReply {
    pub success: bool,
    #[serde(default)]
    pub msg: String,
}

impl RegistryReply {
    pub fn ok() -> Self {
        Self { success: true, msg: String::new() }
    }

    pub fn failure(msg: impl Into<String>) -> Self {
        Self { success: false, msg: msg.into() }
    }

    /// Turn a failure reply into a registry-protocol error.
    pub fn into_result(self) -> tm_domain::Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(tm_domain::Error::Registry(self.msg))
        }
    }
}
