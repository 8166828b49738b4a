use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry leases
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Lease granted by register/keepalive.
    #[serde(default = "d_3600")]
    pub lease_secs: u64,
    /// Interval between garbage-collection sweeps.
    #[serde(default = "d_60")]
    pub gc_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            lease_secs: 3_600,
            gc_interval_secs: 60,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// How often registered tools are re-announced to the registry.
    #[serde(default = "d_10")]
    pub keepalive_interval_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            keepalive_interval_secs: 10,
        }
    }
}

fn d_3600() -> u64 {
    3_600
}

fn d_60() -> u64 {
    60
}

fn d_10() -> u64 {
    10
}
