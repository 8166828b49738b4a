use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Hub (broker) listener
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_4280")]
    pub port: u16,
    /// How long the hub waits for a remote subscriber to answer a
    /// forwarded request.  The caller's own timeout usually fires first.
    #[serde(default = "d_30000")]
    pub forward_timeout_ms: u64,
    /// Inbound frames larger than this are dropped.
    #[serde(default = "d_max_frame")]
    pub max_frame_bytes: usize,
    /// A client that does not send `hello` within this window is dropped.
    #[serde(default = "d_10000")]
    pub hello_timeout_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: 4280,
            forward_timeout_ms: 30_000,
            max_frame_bytes: d_max_frame(),
            hello_timeout_ms: 10_000,
        }
    }
}

impl HubConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn d_host() -> String {
    "127.0.0.1".into()
}

fn d_4280() -> u16 {
    4280
}

fn d_30000() -> u64 {
    30_000
}

fn d_10000() -> u64 {
    10_000
}

fn d_max_frame() -> usize {
    1024 * 1024
}
