//! Bus-facing side of the registry: the four control topics plus the
//! periodic lease sweep.

use std::sync::Arc;
use std::time::Duration;

use tm_bus::rpc::{subscribe_req_resp, subscribe_resp};
use tm_bus::{MessageBus, Subscription};
use tm_domain::config::RegistryConfig;
use tm_domain::{Result, ToolDeclaration};
use tm_protocol::{topics, JsonEncoder, RegistryReply};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::directory::ToolDirectory;

/// A running registry service bound to one bus.
pub struct Registry {
    directory: Arc<ToolDirectory>,
    bus: Arc<dyn MessageBus>,
    subscriptions: Vec<Subscription>,
    cancel: CancellationToken,
}

impl Registry {
    /// Subscribe the control topics and start the GC loop.
    ///
    /// Fails if any control topic already has a responder; topics that were
    /// claimed before the failure are released again.
    pub async fn serve(bus: Arc<dyn MessageBus>, config: &RegistryConfig) -> Result<Self> {
        let directory = Arc::new(ToolDirectory::new(Duration::from_secs(config.lease_secs)));
        let mut subscriptions = Vec::with_capacity(4);

        match subscribe_all(bus.as_ref(), &directory, &mut subscriptions).await {
            Ok(()) => {}
            Err(e) => {
                for sub in &subscriptions {
                    if let Err(e) = bus.unsubscribe(sub).await {
                        tracing::warn!(topic = %sub.topic, error = %e, "rollback unsubscribe failed");
                    }
                }
                return Err(e);
            }
        }

        let cancel = CancellationToken::new();
        let gc_interval = Duration::from_secs(config.gc_interval_secs.max(1));
        tokio::spawn(
            gc_loop(directory.clone(), gc_interval, cancel.clone())
                .instrument(tracing::info_span!("registry.gc")),
        );

        tracing::info!(
            lease_secs = config.lease_secs,
            gc_interval_secs = config.gc_interval_secs,
            "registry serving"
        );

        Ok(Self {
            directory,
            bus,
            subscriptions,
            cancel,
        })
    }

    pub fn directory(&self) -> &Arc<ToolDirectory> {
        &self.directory
    }

    /// Stop the GC loop and release the control topics.
    pub async fn close(&self) -> Result<()> {
        self.cancel.cancel();
        for sub in &self.subscriptions {
            self.bus.unsubscribe(sub).await?;
        }
        tracing::info!("registry stopped");
        Ok(())
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn subscribe_all(
    bus: &dyn MessageBus,
    directory: &Arc<ToolDirectory>,
    subscriptions: &mut Vec<Subscription>,
) -> Result<()> {
    let dir = directory.clone();
    subscriptions.push(
        subscribe_req_resp(bus, topics::REGISTER, JsonEncoder, JsonEncoder, move |decl: ToolDeclaration| {
            let dir = dir.clone();
            async move {
                match dir.register(decl) {
                    Ok(()) => RegistryReply::ok(),
                    Err(e) => RegistryReply::failure(e.to_string()),
                }
            }
        })
        .await?,
    );

    let dir = directory.clone();
    subscriptions.push(
        subscribe_req_resp(bus, topics::UNREGISTER, JsonEncoder, JsonEncoder, move |decl: ToolDeclaration| {
            let dir = dir.clone();
            async move {
                match dir.unregister(&decl.name) {
                    Ok(()) => RegistryReply::ok(),
                    Err(e) => RegistryReply::failure(e.to_string()),
                }
            }
        })
        .await?,
    );

    let dir = directory.clone();
    subscriptions.push(
        subscribe_resp(bus, topics::LIST, JsonEncoder, move || {
            let dir = dir.clone();
            async move { dir.list() }
        })
        .await?,
    );

    let dir = directory.clone();
    subscriptions.push(
        subscribe_req_resp(bus, topics::KEEPALIVE, JsonEncoder, JsonEncoder, move |decls: Vec<ToolDeclaration>| {
            let dir = dir.clone();
            async move {
                dir.keepalive(decls);
                RegistryReply::ok()
            }
        })
        .await?,
    );

    Ok(())
}

async fn gc_loop(directory: Arc<ToolDirectory>, every: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    // The first tick fires immediately; skip it.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let removed = directory.sweep();
                if !removed.is_empty() {
                    tracing::debug!(removed = removed.len(), remaining = directory.len(), "sweep complete");
                }
            }
        }
    }
}
