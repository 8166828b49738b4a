//! `toolmesh chat` — one orchestrated exchange against the configured model.

use std::io::Write;

use anyhow::Context;
use tm_agent::{Connection, ConnectionOptions};
use tm_bus::{MessageBus, WsBus};
use tm_domain::config::Config;
use tm_orchestrator::{Session, SessionOptions};

pub async fn chat(
    config: &Config,
    message: String,
    model: Option<String>,
    system: Option<String>,
) -> anyhow::Result<()> {
    let llm = tm_providers::from_config(&config.llm)?;
    let bus = WsBus::connect(&config.bus)
        .await
        .with_context(|| format!("connecting to {}", config.bus.url))?;
    let conn = Connection::new(bus.clone(), ConnectionOptions::from_config(config));

    let mut options = SessionOptions::from_config(config);
    if let Some(model) = model {
        options = options.model(model);
    }
    if let Some(system) = system {
        options = options.system_instruction(system);
    }

    let result = run(llm.as_ref(), conn.clone(), options, message).await;
    conn.close().await.ok();
    bus.close().await.ok();
    result
}

async fn run(
    llm: &dyn tm_providers::ChatModel,
    conn: std::sync::Arc<Connection>,
    options: SessionOptions,
    message: String,
) -> anyhow::Result<()> {
    let session = Session::create(llm, conn, options).await?;
    eprintln!("\x1B[2m[{} tool(s) declared]\x1B[0m", session.tools().len());

    let mut stream = session.send_text(message);
    while let Some(fragment) = stream.next_text().await {
        print!("{}", fragment?);
        std::io::stdout().flush().ok();
    }
    println!();
    Ok(())
}
