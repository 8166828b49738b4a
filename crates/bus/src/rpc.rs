//! Typed request/response on top of [`MessageBus`].

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tm_domain::Result;
use tm_protocol::Encoder;

use crate::traits::{MessageBus, Payload, RawHandler, Subscription};

/// Send an empty request and decode the first reply.
pub async fn request<Resp, E>(
    bus: &dyn MessageBus,
    topic: &str,
    resp_enc: &E,
    timeout: Duration,
) -> Result<Resp>
where
    E: Encoder<Resp> + ?Sized,
{
    let reply = bus.request(topic, Vec::new(), timeout).await?;
    resp_enc.decode(&reply)
}

/// Encode `req`, send it, and decode the first reply.
pub async fn request_with_data<Req, Resp, D, E>(
    bus: &dyn MessageBus,
    topic: &str,
    req_enc: &D,
    resp_enc: &E,
    req: &Req,
    timeout: Duration,
) -> Result<Resp>
where
    D: Encoder<Req> + ?Sized,
    E: Encoder<Resp> + ?Sized,
{
    let payload = req_enc.encode(req)?;
    let reply = bus.request(topic, payload, timeout).await?;
    resp_enc.decode(&reply)
}

/// Answer every request on `topic` with `handler()`, ignoring the body.
pub async fn subscribe_resp<Resp, E, F, Fut>(
    bus: &dyn MessageBus,
    topic: &str,
    resp_enc: E,
    handler: F,
) -> Result<Subscription>
where
    Resp: Send + 'static,
    E: Encoder<Resp> + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Resp> + Send + 'static,
{
    let adapter = RespAdapter {
        topic: topic.to_string(),
        resp_enc,
        handler,
        _resp: PhantomData,
    };
    bus.subscribe(topic, Arc::new(adapter)).await
}

/// Decode each request, run `handler`, and reply with its encoded result.
///
/// A request that fails to decode is logged and dropped.
pub async fn subscribe_req_resp<Req, Resp, D, E, F, Fut>(
    bus: &dyn MessageBus,
    topic: &str,
    req_enc: D,
    resp_enc: E,
    handler: F,
) -> Result<Subscription>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    D: Encoder<Req> + 'static,
    E: Encoder<Resp> + 'static,
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Resp> + Send + 'static,
{
    let adapter = ReqRespAdapter {
        topic: topic.to_string(),
        req_enc,
        resp_enc,
        handler,
        _types: PhantomData,
    };
    bus.subscribe(topic, Arc::new(adapter)).await
}

// ── Adapters ─────────────────────────────────────────────────────────

struct RespAdapter<Resp, E, F> {
    topic: String,
    resp_enc: E,
    handler: F,
    _resp: PhantomData<fn() -> Resp>,
}

#[async_trait::async_trait]
impl<Resp, E, F, Fut> RawHandler for RespAdapter<Resp, E, F>
where
    Resp: Send + 'static,
    E: Encoder<Resp> + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Resp> + Send + 'static,
{
    async fn handle(&self, _payload: Payload) -> Option<Payload> {
        let resp = (self.handler)().await;
        encode_reply(&self.topic, &self.resp_enc, &resp)
    }
}

struct ReqRespAdapter<Req, Resp, D, E, F> {
    topic: String,
    req_enc: D,
    resp_enc: E,
    handler: F,
    _types: PhantomData<fn(Req) -> Resp>,
}

#[async_trait::async_trait]
impl<Req, Resp, D, E, F, Fut> RawHandler for ReqRespAdapter<Req, Resp, D, E, F>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    D: Encoder<Req> + 'static,
    E: Encoder<Resp> + 'static,
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Resp> + Send + 'static,
{
    async fn handle(&self, payload: Payload) -> Option<Payload> {
        let req = match self.req_enc.decode(&payload) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(topic = %self.topic, error = %e, "dropping undecodable request");
                return None;
            }
        };
        let resp = (self.handler)(req).await;
        encode_reply(&self.topic, &self.resp_enc, &resp)
    }
}

fn encode_reply<Resp, E: Encoder<Resp> + ?Sized>(topic: &str, enc: &E, resp: &Resp) -> Option<Payload> {
    match enc.encode(resp) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::error!(topic = %topic, error = %e, "failed to encode reply");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalBus;
    use tm_domain::{Error, JsonMap};
    use tm_protocol::JsonEncoder;

    const T: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn typed_round_trip() {
        let bus = LocalBus::new();
        subscribe_req_resp(&bus, "sum", JsonEncoder, JsonEncoder, |req: JsonMap| async move {
            JsonMap::new().with("result", req.int("a", 0) + req.int("b", 0))
        })
        .await
        .unwrap();

        let req = JsonMap::new().with("a", 35).with("b", 21);
        let resp: JsonMap = request_with_data(&bus, "sum", &JsonEncoder, &JsonEncoder, &req, T)
            .await
            .unwrap();
        assert_eq!(resp.int("result", 0), 56);
    }

    #[tokio::test]
    async fn request_without_body() {
        let bus = LocalBus::new();
        subscribe_resp(&bus, "names", JsonEncoder, || async { vec!["a".to_string()] })
            .await
            .unwrap();
        let names: Vec<String> = request(&bus, "names", &JsonEncoder, T).await.unwrap();
        assert_eq!(names, vec!["a"]);
    }

    #[tokio::test]
    async fn undecodable_request_surfaces_as_timeout() {
        let bus = LocalBus::new();
        subscribe_req_resp(&bus, "n", JsonEncoder, JsonEncoder, |n: u32| async move { n + 1 })
            .await
            .unwrap();
        let err = request_with_data::<_, u32, _, _>(&bus, "n", &JsonEncoder, &JsonEncoder, &"x".to_string(), T)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn undecodable_reply_is_a_decode_error() {
        let bus = LocalBus::new();
        subscribe_resp(&bus, "s", JsonEncoder, || async { "text".to_string() })
            .await
            .unwrap();
        let err = request::<u32, _>(&bus, "s", &JsonEncoder, T).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
