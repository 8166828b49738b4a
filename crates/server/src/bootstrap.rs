//! Daemon construction shared by `serve` and the integration tests.

use std::sync::Arc;

use axum::Router;
use tm_bus::Hub;
use tm_domain::config::{Config, ConfigSeverity};
use tm_registry::Registry;

/// The registry daemon: a WebSocket hub with the registry service bound
/// to the hub's own topic space.
pub struct Daemon {
    pub hub: Arc<Hub>,
    pub registry: Registry,
}

impl Daemon {
    /// Validate config, start the hub and bind the registry to it.
    pub async fn start(config: &Config) -> anyhow::Result<Self> {
        let issues = config.validate();
        for issue in &issues {
            match issue.severity {
                ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
                ConfigSeverity::Error => tracing::error!("config: {issue}"),
            }
        }
        let errors = issues
            .iter()
            .filter(|i| i.severity == ConfigSeverity::Error)
            .count();
        if errors > 0 {
            anyhow::bail!("config validation failed with {errors} error(s)");
        }

        let hub = Hub::new(config.hub.clone());
        let registry = Registry::serve(hub.bus(), &config.registry).await?;
        tracing::info!(
            lease_secs = config.registry.lease_secs,
            gc_interval_secs = config.registry.gc_interval_secs,
            "registry bound to hub"
        );
        Ok(Self { hub, registry })
    }

    /// HTTP surface: the bus endpoint plus `GET /health`.
    pub fn router(&self) -> Router {
        self.hub
            .router()
            .route("/health", axum::routing::get(health))
            .layer(tower_http::trace::TraceLayer::new_for_http())
            .layer(tower::limit::ConcurrencyLimitLayer::new(1024))
    }

    pub async fn shutdown(self) {
        if let Err(e) = self.registry.close().await {
            tracing::warn!(error = %e, "registry close failed");
        }
    }
}

async fn health() -> &'static str {
    "ok"
}
