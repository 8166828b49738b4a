use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bus client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// WebSocket endpoint of the hub.
    #[serde(default = "d_bus_url")]
    pub url: String,
    /// Name announced in the hello frame.  Defaults to `$HOSTNAME`.
    #[serde(default = "d_client_name")]
    pub client_name: String,
    /// Per-request timeout for every topic request made through this client.
    #[serde(default = "d_5000")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: d_bus_url(),
            client_name: d_client_name(),
            request_timeout_ms: 5_000,
            reconnect: ReconnectConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "d_1000")]
    pub initial_delay_ms: u64,
    #[serde(default = "d_60000")]
    pub max_delay_ms: u64,
    #[serde(default = "d_factor")]
    pub backoff_factor: f64,
    /// `0` retries forever.
    #[serde(default)]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            backoff_factor: 2.0,
            max_attempts: 0,
        }
    }
}

fn d_bus_url() -> String {
    "ws://127.0.0.1:4280/v1/bus".into()
}

fn d_client_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| {
            let id = uuid::Uuid::new_v4().simple().to_string();
            format!("toolmesh-{}", &id[..8])
        })
}

fn d_5000() -> u64 {
    5_000
}

fn d_1000() -> u64 {
    1_000
}

fn d_60000() -> u64 {
    60_000
}

fn d_factor() -> f64 {
    2.0
}
