//! End-to-end: two WebSocket clients talking through an in-process hub.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tm_bus::rpc::{request_with_data, subscribe_req_resp};
use tm_bus::{Hub, MessageBus, WsBus};
use tm_domain::config::{BusConfig, HubConfig};
use tm_domain::{Error, JsonMap};
use tm_protocol::JsonEncoder;

const T: Duration = Duration::from_secs(2);

async fn start_hub() -> (Arc<Hub>, SocketAddr) {
    let hub = Hub::new(HubConfig::default());
    let app = hub.router();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (hub, addr)
}

fn client_config(addr: SocketAddr, name: &str) -> BusConfig {
    BusConfig {
        url: format!("ws://{addr}/v1/bus"),
        client_name: name.into(),
        ..Default::default()
    }
}

async fn wait_for<F: Fn() -> bool>(cond: F) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn request_crosses_the_hub() {
    let (_hub, addr) = start_hub().await;
    let agent = WsBus::connect(&client_config(addr, "agent")).await.unwrap();
    let caller = WsBus::connect(&client_config(addr, "caller")).await.unwrap();

    subscribe_req_resp(agent.as_ref(), "math:add", JsonEncoder, JsonEncoder, |m: JsonMap| async move {
        JsonMap::new().with("result", m.int("a", 0) + m.int("b", 0))
    })
    .await
    .unwrap();

    let req = JsonMap::new().with("a", 35).with("b", 21);
    let resp: JsonMap =
        request_with_data(caller.as_ref(), "math:add", &JsonEncoder, &JsonEncoder, &req, T)
            .await
            .unwrap();
    assert_eq!(resp.int("result", 0), 56);
}

#[tokio::test]
async fn hub_local_responder_is_reachable_from_clients() {
    let (hub, addr) = start_hub().await;
    subscribe_req_resp(hub.bus().as_ref(), "echo", JsonEncoder, JsonEncoder, |s: String| async move { s })
        .await
        .unwrap();

    let caller = WsBus::connect(&client_config(addr, "caller")).await.unwrap();
    let back: String =
        request_with_data(caller.as_ref(), "echo", &JsonEncoder, &JsonEncoder, &"hi".to_string(), T)
            .await
            .unwrap();
    assert_eq!(back, "hi");
}

#[tokio::test]
async fn unknown_topic_reports_no_responders() {
    let (_hub, addr) = start_hub().await;
    let caller = WsBus::connect(&client_config(addr, "caller")).await.unwrap();
    let err = caller.request("nobody:home", Vec::new(), T).await.unwrap_err();
    assert!(matches!(err, Error::NoResponders(_)), "got {err:?}");
}

#[tokio::test]
async fn topic_owned_by_another_client_is_refused() {
    let (_hub, addr) = start_hub().await;
    let a = WsBus::connect(&client_config(addr, "a")).await.unwrap();
    let b = WsBus::connect(&client_config(addr, "b")).await.unwrap();

    subscribe_req_resp(a.as_ref(), "t", JsonEncoder, JsonEncoder, |n: u32| async move { n })
        .await
        .unwrap();
    let err = subscribe_req_resp(b.as_ref(), "t", JsonEncoder, JsonEncoder, |n: u32| async move { n })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Subscribe { .. }));
}

#[tokio::test]
async fn closing_a_client_releases_its_topics() {
    let (hub, addr) = start_hub().await;
    let agent = WsBus::connect(&client_config(addr, "agent")).await.unwrap();
    subscribe_req_resp(agent.as_ref(), "gone", JsonEncoder, JsonEncoder, |n: u32| async move { n })
        .await
        .unwrap();
    assert_eq!(hub.topics(), vec!["gone".to_string()]);

    agent.close().await.unwrap();
    wait_for(|| hub.topics().is_empty()).await;
    wait_for(|| hub.client_count() == 0).await;
}

#[tokio::test]
async fn close_hangs_up_the_socket() {
    let (hub, addr) = start_hub().await;
    let a = WsBus::connect(&client_config(addr, "a")).await.unwrap();
    let b = WsBus::connect(&client_config(addr, "b")).await.unwrap();
    wait_for(|| hub.client_count() == 2).await;

    a.close().await.unwrap();
    wait_for(|| hub.client_count() == 1).await;
    assert!(!a.is_connected());
    let err = a.request("anything", Vec::new(), T).await.unwrap_err();
    assert!(matches!(err, Error::Bus(_)), "got {err:?}");

    drop(b);
    wait_for(|| hub.client_count() == 0).await;
}

#[tokio::test]
async fn released_topic_can_be_claimed_by_another_client() {
    let (hub, addr) = start_hub().await;
    let a = WsBus::connect(&client_config(addr, "a")).await.unwrap();
    let b = WsBus::connect(&client_config(addr, "b")).await.unwrap();
    subscribe_req_resp(a.as_ref(), "t", JsonEncoder, JsonEncoder, |n: u32| async move { n })
        .await
        .unwrap();

    a.close().await.unwrap();
    wait_for(|| hub.topics().is_empty()).await;
    subscribe_req_resp(b.as_ref(), "t", JsonEncoder, JsonEncoder, |n: u32| async move { n + 1 })
        .await
        .unwrap();
    let back: u32 = request_with_data(b.as_ref(), "t", &JsonEncoder, &JsonEncoder, &1u32, T)
        .await
        .unwrap();
    assert_eq!(back, 2);
}
