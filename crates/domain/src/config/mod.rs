mod bus;
mod llm;
mod observability;
mod registry;
mod server;
mod session;

pub use bus::*;
pub use llm::*;
pub use observability::*;
pub use registry::*;
pub use server::*;
pub use session::*;

use std::fmt;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Check the configuration for values that cannot work.  An empty
    /// vec means the config is usable.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let mut error = |field: &str, message: &str| {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: field.into(),
                message: message.into(),
            })
        };

        if self.hub.port == 0 {
            error("hub.port", "port must be greater than 0");
        }
        if self.hub.host.is_empty() {
            error("hub.host", "host must not be empty");
        }
        if self.bus.url.is_empty() {
            error("bus.url", "url must not be empty");
        }
        if self.bus.request_timeout_ms == 0 {
            error("bus.request_timeout_ms", "timeout must be greater than 0");
        }
        if self.registry.lease_secs == 0 {
            error("registry.lease_secs", "lease must be greater than 0");
        }
        if self.registry.gc_interval_secs == 0 {
            error("registry.gc_interval_secs", "interval must be greater than 0");
        }
        if self.connection.keepalive_interval_secs == 0 {
            error("connection.keepalive_interval_secs", "interval must be greater than 0");
        }
        if self.session.max_turns == 0 {
            error("session.max_turns", "must allow at least one turn");
        }
        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            error("observability.sample_rate", "must be within 0.0..=1.0");
        }

        if self.registry.lease_secs < self.registry.gc_interval_secs {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "registry.lease_secs".into(),
                message: "lease is shorter than the GC interval".into(),
            });
        }
        if self.connection.keepalive_interval_secs >= self.registry.lease_secs {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "connection.keepalive_interval_secs".into(),
                message: "keepalive does not fire before the lease expires".into(),
            });
        }

        issues
    }
}
