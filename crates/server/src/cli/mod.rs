pub mod chat;
pub mod config;
pub mod tools;

use std::path::Path;

use clap::{Parser, Subcommand};
use tm_domain::config::Config;

/// toolmesh — a tool registry and model orchestrator over a message bus.
#[derive(Debug, Parser)]
#[command(name = "toolmesh", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the hub and the registry (default when no subcommand is given).
    Serve,
    /// List the tools currently registered.
    Tools,
    /// Invoke a tool over the bus and print its response.
    Call {
        /// Tool name.
        name: String,
        /// Arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Send one message through an orchestrated session and stream the reply.
    Chat {
        message: String,
        /// Model override.
        #[arg(long)]
        model: Option<String>,
        /// System instruction for the session.
        #[arg(long)]
        system: Option<String>,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any issues.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from `TM_CONFIG` (or `toolmesh.toml`).  Returns
/// the parsed [`Config`] and the path that was used.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("TM_CONFIG").unwrap_or_else(|_| "toolmesh.toml".into());
    let config = load_config_from(Path::new(&config_path))?;
    Ok((config, config_path))
}

/// A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))
}
