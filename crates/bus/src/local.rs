//! In-process bus.  Also the routing core of the hub.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::RwLock;
use tm_domain::{Error, Result};

use crate::traits::{MessageBus, Payload, RawHandler, Subscription};

struct Route {
    id: u64,
    handler: Arc<dyn RawHandler>,
}

#[derive(Default)]
pub struct LocalBus {
    routes: RwLock<HashMap<String, Route>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.routes.read().keys().cloned().collect();
        topics.sort();
        topics
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::Bus("bus closed".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl MessageBus for LocalBus {
    async fn request(&self, topic: &str, payload: Payload, timeout: Duration) -> Result<Payload> {
        self.ensure_open()?;
        let handler = self
            .routes
            .read()
            .get(topic)
            .map(|r| r.handler.clone())
            .ok_or_else(|| Error::NoResponders(topic.to_string()))?;

        // The handler runs on its own task so that a caller giving up does
        // not cancel work the responder already started.
        let task = tokio::spawn(async move {
            AssertUnwindSafe(handler.handle(payload)).catch_unwind().await
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(Some(reply)))) => Ok(reply),
            Ok(Ok(Ok(None))) => Err(Error::Timeout(format!("{topic}: responder sent no reply"))),
            Ok(Ok(Err(_panic))) => {
                tracing::error!(topic = %topic, "responder panicked");
                Err(Error::Bus(format!("{topic}: responder panicked")))
            }
            Ok(Err(e)) => Err(Error::Bus(format!("{topic}: {e}"))),
            Err(_) => Err(Error::Timeout(format!(
                "{topic}: no reply within {}ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn subscribe(&self, topic: &str, handler: Arc<dyn RawHandler>) -> Result<Subscription> {
        self.ensure_open()?;
        let mut routes = self.routes.write();
        if routes.contains_key(topic) {
            return Err(Error::Subscribe {
                topic: topic.to_string(),
                message: "topic already has a responder".into(),
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        routes.insert(topic.to_string(), Route { id, handler });
        tracing::debug!(topic = %topic, id, "subscribed");
        Ok(Subscription { topic: topic.to_string(), id })
    }

    async fn unsubscribe(&self, sub: &Subscription) -> Result<()> {
        let mut routes = self.routes.write();
        if routes.get(&sub.topic).is_some_and(|r| r.id == sub.id) {
            routes.remove(&sub.topic);
            tracing::debug!(topic = %sub.topic, id = sub.id, "unsubscribed");
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.routes.write().clear();
        Ok(())
    }
}
