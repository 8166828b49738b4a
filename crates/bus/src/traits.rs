use std::sync::Arc;
use std::time::Duration;

use tm_domain::Result;

/// Raw message body.  Typing happens one layer up, in [`crate::rpc`].
pub type Payload = Vec<u8>;

/// Standing responder for one topic.
#[async_trait::async_trait]
pub trait RawHandler: Send + Sync {
    /// Produce the reply for one inbound request.  `None` sends nothing
    /// back; the requester observes a timeout.
    async fn handle(&self, payload: Payload) -> Option<Payload>;
}

/// Handle to an active subscription, needed to remove it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String,
    pub id: u64,
}

/// Topic-addressed request/response substrate.
///
/// At most one responder owns a topic.  A request is answered by that
/// responder or fails with `Timeout` / `NoResponders`.
#[async_trait::async_trait]
pub trait MessageBus: Send + Sync {
    async fn request(&self, topic: &str, payload: Payload, timeout: Duration) -> Result<Payload>;

    async fn subscribe(&self, topic: &str, handler: Arc<dyn RawHandler>) -> Result<Subscription>;

    async fn unsubscribe(&self, sub: &Subscription) -> Result<()>;

    /// Drop every subscription and refuse further requests.
    async fn close(&self) -> Result<()>;
}
