//! Reference agent for toolmesh.
//!
//! Connects to the hub over WebSocket, registers `add` and `multiply`, and
//! serves them until interrupted.
//!
//! Usage:
//!   tm-hello-agent ws://127.0.0.1:4280/v1/bus
//!
//! Env vars:
//!   TM_AGENT_NAME — client name announced to the hub (default: "hello-agent")

use tm_agent::{Connection, ConnectionOptions};
use tm_bus::{MessageBus, WsBus};
use tm_domain::config::{BusConfig, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut bus_config = BusConfig {
        client_name: std::env::var("TM_AGENT_NAME").unwrap_or_else(|_| "hello-agent".into()),
        ..Default::default()
    };
    if let Some(url) = std::env::args().nth(1) {
        bus_config.url = url;
    }

    tracing::info!(url = %bus_config.url, client = %bus_config.client_name, "connecting to hub");
    let bus = WsBus::connect(&bus_config).await?;
    let conn = Connection::new(bus.clone(), ConnectionOptions::from_config(&Config::default()));

    for tool in tm_hello_agent::tools() {
        let name = tool.name().to_string();
        conn.register_tool(tool).await?;
        tracing::info!(tool = %name, "tool registered");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupted, unregistering");
    conn.close().await?;
    bus.close().await?;
    Ok(())
}
