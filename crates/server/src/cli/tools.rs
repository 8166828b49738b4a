//! `toolmesh tools` and `toolmesh call`: one-shot clients of a running daemon.

use std::sync::Arc;

use anyhow::Context;
use tm_agent::{Connection, ConnectionOptions};
use tm_bus::{MessageBus, WsBus};
use tm_domain::config::Config;
use tm_domain::JsonMap;

async fn connect(config: &Config) -> anyhow::Result<(Arc<WsBus>, Arc<Connection>)> {
    let bus = WsBus::connect(&config.bus)
        .await
        .with_context(|| format!("connecting to {}", config.bus.url))?;
    let conn = Connection::new(bus.clone(), ConnectionOptions::from_config(config));
    Ok((bus, conn))
}

async fn disconnect(bus: &WsBus, conn: &Connection) {
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "connection close failed");
    }
    if let Err(e) = bus.close().await {
        tracing::warn!(error = %e, "bus close failed");
    }
}

pub async fn list(config: &Config) -> anyhow::Result<()> {
    let (bus, conn) = connect(config).await?;
    let tools = conn.list_tools().await;
    disconnect(&bus, &conn).await;

    let tools = tools?;
    if tools.is_empty() {
        eprintln!("no tools registered");
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&tools)?);
    Ok(())
}

pub async fn call(config: &Config, name: &str, args: &str) -> anyhow::Result<()> {
    let args = parse_args(args)?;
    let (bus, conn) = connect(config).await?;
    let response = conn.call_function(name, args).await;
    disconnect(&bus, &conn).await;

    let response = response?;
    if let Some(err) = response.error() {
        anyhow::bail!("{name}: {err}");
    }
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn parse_args(raw: &str) -> anyhow::Result<JsonMap> {
    let value: serde_json::Value = serde_json::from_str(raw).context("--args is not valid JSON")?;
    JsonMap::from_value(value).context("--args must be a JSON object")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_must_be_an_object() {
        assert_eq!(parse_args(r#"{"a": 1}"#).unwrap().int("a", 0), 1);
        assert!(parse_args("[1, 2]").is_err());
        assert!(parse_args("{").is_err());
    }
}
