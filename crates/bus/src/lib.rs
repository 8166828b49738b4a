//! `tm-bus` — topic request/response transport.
//!
//! [`LocalBus`] serves a single process.  [`Hub`] exposes the same topic
//! space over WebSocket and [`WsBus`] is its client, so registry, agents
//! and orchestrators can live in different processes while talking to a
//! `dyn MessageBus` either way.  [`rpc`] adds typed encode/decode on top.

pub mod client;
pub mod hub;
pub mod local;
pub mod reconnect;
pub mod rpc;
pub mod traits;

pub use client::WsBus;
pub use hub::Hub;
pub use local::LocalBus;
pub use reconnect::ReconnectBackoff;
pub use traits::{MessageBus, Payload, RawHandler, Subscription};
