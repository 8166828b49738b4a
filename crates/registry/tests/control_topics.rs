use std::sync::Arc;
use std::time::Duration;

use tm_bus::rpc::{request, request_with_data, subscribe_resp};
use tm_bus::{LocalBus, MessageBus};
use tm_domain::config::RegistryConfig;
use tm_domain::{Error, ToolDeclaration};
use tm_protocol::{topics, JsonEncoder, RegistryReply};
use tm_registry::Registry;

const T: Duration = Duration::from_secs(1);

async fn setup(config: RegistryConfig) -> (Arc<LocalBus>, Registry) {
    let bus = Arc::new(LocalBus::new());
    let registry = Registry::serve(bus.clone(), &config).await.unwrap();
    (bus, registry)
}

async fn register(bus: &LocalBus, decl: &ToolDeclaration) -> RegistryReply {
    request_with_data(bus, topics::REGISTER, &JsonEncoder, &JsonEncoder, decl, T)
        .await
        .unwrap()
}

async fn list(bus: &LocalBus) -> Vec<String> {
    let decls: Vec<ToolDeclaration> = request(bus, topics::LIST, &JsonEncoder, T).await.unwrap();
    decls.into_iter().map(|d| d.name).collect()
}

#[tokio::test]
async fn register_list_unregister() {
    let (bus, _registry) = setup(RegistryConfig::default()).await;
    let add = ToolDeclaration::new("add", "adds two integers");

    assert!(register(&bus, &add).await.success);
    assert_eq!(list(&bus).await, vec!["add"]);

    let dup = register(&bus, &add).await;
    assert!(!dup.success);
    assert!(dup.msg.contains("already registered"));

    let reply: RegistryReply =
        request_with_data(bus.as_ref(), topics::UNREGISTER, &JsonEncoder, &JsonEncoder, &add, T)
            .await
            .unwrap();
    assert!(reply.success);
    assert!(list(&bus).await.is_empty());

    let reply: RegistryReply =
        request_with_data(bus.as_ref(), topics::UNREGISTER, &JsonEncoder, &JsonEncoder, &add, T)
            .await
            .unwrap();
    assert!(!reply.success);
    assert!(reply.msg.contains("not found"));
}

#[tokio::test]
async fn keepalive_registers_unknown_tools() {
    let (bus, _registry) = setup(RegistryConfig::default()).await;
    let decls = vec![ToolDeclaration::new("mul", ""), ToolDeclaration::new("add", "")];
    let reply: RegistryReply =
        request_with_data(bus.as_ref(), topics::KEEPALIVE, &JsonEncoder, &JsonEncoder, &decls, T)
            .await
            .unwrap();
    assert!(reply.success);
    assert_eq!(list(&bus).await, vec!["add", "mul"]);
}

#[tokio::test]
async fn malformed_register_gets_no_reply() {
    let (bus, _registry) = setup(RegistryConfig::default()).await;
    let err = bus
        .request(topics::REGISTER, b"not json".to_vec(), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
}

#[tokio::test(start_paused = true)]
async fn gc_sweeps_expired_leases() {
    let config = RegistryConfig { lease_secs: 30, gc_interval_secs: 10 };
    let (bus, registry) = setup(config).await;
    register(&bus, &ToolDeclaration::new("add", "")).await;
    assert_eq!(registry.directory().len(), 1);

    tokio::time::sleep(Duration::from_secs(45)).await;
    assert!(list(&bus).await.is_empty());
    assert_eq!(registry.directory().len(), 0);
}

#[tokio::test]
async fn second_registry_on_same_bus_is_refused() {
    let (bus, first) = setup(RegistryConfig::default()).await;
    let err = Registry::serve(bus.clone(), &RegistryConfig::default()).await.err().unwrap();
    assert!(matches!(err, Error::Subscribe { .. }));
    // The first registry still owns every control topic.
    assert_eq!(bus.topics().len(), 4);

    first.close().await.unwrap();
    assert!(bus.topics().is_empty());
}

#[tokio::test]
async fn failed_serve_releases_the_topics_it_claimed() {
    let bus = Arc::new(LocalBus::new());
    let _foreign = subscribe_resp(bus.as_ref(), topics::LIST, JsonEncoder, || async {
        Vec::<ToolDeclaration>::new()
    })
    .await
    .unwrap();

    let err = Registry::serve(bus.clone(), &RegistryConfig::default()).await.err().unwrap();
    assert!(matches!(err, Error::Subscribe { ref topic, .. } if topic == topics::LIST));
    assert_eq!(bus.topics(), vec![topics::LIST.to_string()]);
}
