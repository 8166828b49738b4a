//! Agent-side binding to the bus: serves local tools, keeps their leases
//! alive, and proxies calls to remote ones.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tm_bus::rpc::{request, request_with_data, subscribe_req_resp};
use tm_bus::{MessageBus, Subscription};
use tm_domain::config::Config;
use tm_domain::{JsonMap, Result, ToolDeclaration};
use tm_protocol::{topics, JsonEncoder, RegistryReply};
use tokio_util::sync::CancellationToken;

use crate::call::handle_tool_call;
use crate::caller::FunctionCaller;
use crate::tool::Tool;

#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub keepalive_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ConnectionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            keepalive_interval: Duration::from_secs(config.connection.keepalive_interval_secs),
            request_timeout: Duration::from_millis(config.bus.request_timeout_ms),
        }
    }
}

struct Served {
    tool: Arc<Tool>,
    subscription: Subscription,
}

pub struct Connection {
    bus: Arc<dyn MessageBus>,
    served: RwLock<Vec<Served>>,
    /// Serialises `register_tool` so subscribe+register is atomic per name.
    registering: tokio::sync::Mutex<()>,
    request_timeout: Duration,
    cancel: CancellationToken,
    closed: Mutex<bool>,
}

impl Connection {
    /// Bind to `bus` and start the keepalive loop.
    pub fn new(bus: Arc<dyn MessageBus>, options: ConnectionOptions) -> Arc<Self> {
        let conn = Arc::new(Self {
            bus,
            served: RwLock::new(Vec::new()),
            registering: tokio::sync::Mutex::new(()),
            request_timeout: options.request_timeout,
            cancel: CancellationToken::new(),
            closed: Mutex::new(false),
        });

        let every = options.keepalive_interval.max(Duration::from_millis(1));
        tokio::spawn(keepalive_loop(
            Arc::downgrade(&conn),
            every,
            conn.cancel.clone(),
        ));
        conn
    }

    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }

    /// Serve `tool` on its invocation topic, then register it.
    ///
    /// The subscription comes first so that a tool is never listed before
    /// it can answer.  If registration is refused the subscription is
    /// released again.
    pub async fn register_tool(&self, tool: Tool) -> Result<()> {
        let _guard = self.registering.lock().await;
        let tool = Arc::new(tool);
        let topic = topics::tool_topic(&tool.name);

        let served = tool.clone();
        let subscription = subscribe_req_resp(
            self.bus.as_ref(),
            &topic,
            JsonEncoder,
            JsonEncoder,
            move |args: JsonMap| {
                let tool = served.clone();
                async move { handle_tool_call(&tool, args).await }
            },
        )
        .await?;

        let declaration = tool.declaration();
        let registered = request_with_data::<_, RegistryReply, _, _>(
            self.bus.as_ref(),
            topics::REGISTER,
            &JsonEncoder,
            &JsonEncoder,
            &declaration,
            self.request_timeout,
        )
        .await
        .and_then(RegistryReply::into_result);

        if let Err(e) = registered {
            if let Err(unsub) = self.bus.unsubscribe(&subscription).await {
                tracing::warn!(tool = %tool.name, error = %unsub, "failed to release tool topic");
            }
            return Err(e);
        }

        tracing::info!(tool = %tool.name, topic = %topic, "tool registered");
        self.served.write().push(Served { tool, subscription });
        Ok(())
    }

    pub fn tool(&self, name: &str) -> Option<Arc<Tool>> {
        self.served
            .read()
            .iter()
            .find(|s| s.tool.name == name)
            .map(|s| s.tool.clone())
    }

    pub fn tools(&self) -> Vec<Arc<Tool>> {
        self.served.read().iter().map(|s| s.tool.clone()).collect()
    }

    fn declarations(&self) -> Vec<ToolDeclaration> {
        self.served.read().iter().map(|s| s.tool.declaration()).collect()
    }

    /// Live declarations according to the registry.
    pub async fn list_tools(&self) -> Result<Vec<ToolDeclaration>> {
        request(self.bus.as_ref(), topics::LIST, &JsonEncoder, self.request_timeout).await
    }

    /// Call `name`, in-process when this connection serves it.
    pub async fn call(&self, name: &str, args: JsonMap) -> Result<JsonMap> {
        match self.tool(name) {
            Some(tool) => Ok(handle_tool_call(&tool, args).await),
            None => self.call_function(name, args).await,
        }
    }

    /// Call `name` over the bus and return its raw response.
    pub async fn call_function(&self, name: &str, args: JsonMap) -> Result<JsonMap> {
        request_with_data(
            self.bus.as_ref(),
            &topics::tool_topic(name),
            &JsonEncoder,
            &JsonEncoder,
            &args,
            self.request_timeout,
        )
        .await
    }

    /// Re-announce every served tool once.
    pub async fn keepalive_once(&self) -> Result<()> {
        let declarations = self.declarations();
        if declarations.is_empty() {
            return Ok(());
        }
        let reply: RegistryReply = request_with_data(
            self.bus.as_ref(),
            topics::KEEPALIVE,
            &JsonEncoder,
            &JsonEncoder,
            &declarations,
            self.request_timeout,
        )
        .await?;
        reply.into_result()
    }

    /// Unregister every served tool.  All are attempted; the first
    /// failure is returned.
    pub async fn unregister_tools(&self) -> Result<()> {
        let mut first_err = None;
        for declaration in self.declarations() {
            let outcome = request_with_data::<_, RegistryReply, _, _>(
                self.bus.as_ref(),
                topics::UNREGISTER,
                &JsonEncoder,
                &JsonEncoder,
                &declaration,
                self.request_timeout,
            )
            .await
            .and_then(RegistryReply::into_result);
            if let Err(e) = outcome {
                tracing::warn!(tool = %declaration.name, error = %e, "unregister failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Stop keepalive, release this connection's tool topics, then
    /// unregister from the registry.  The bus stays open for its owner,
    /// who closes it separately.  Idempotent.
    pub async fn close(&self) -> Result<()> {
        {
            let mut closed = self.closed.lock();
            if *closed {
                return Ok(());
            }
            *closed = true;
        }
        self.cancel.cancel();

        let subscriptions: Vec<Subscription> =
            self.served.read().iter().map(|s| s.subscription.clone()).collect();
        for sub in &subscriptions {
            if let Err(e) = self.bus.unsubscribe(sub).await {
                tracing::warn!(topic = %sub.topic, error = %e, "unsubscribe failed");
            }
        }

        let unregistered = self.unregister_tools().await;
        tracing::info!(tools = subscriptions.len(), "connection closed");
        unregistered
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn keepalive_loop(conn: Weak<Connection>, every: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(conn) = conn.upgrade() else { break };
                if let Err(e) = conn.keepalive_once().await {
                    tracing::warn!(error = %e, "keepalive failed");
                }
            }
        }
    }
    tracing::debug!("keepalive loop stopped");
}

#[async_trait]
impl FunctionCaller for Connection {
    async fn list_tools(&self) -> Result<Vec<ToolDeclaration>> {
        Connection::list_tools(self).await
    }

    fn local_tools(&self) -> Vec<ToolDeclaration> {
        self.declarations()
    }

    async fn call_function(&self, name: &str, args: JsonMap) -> Result<JsonMap> {
        Connection::call_function(self, name, args).await
    }

    async fn call_local(&self, name: &str, args: JsonMap) -> Option<JsonMap> {
        let tool = self.tool(name)?;
        Some(handle_tool_call(&tool, args).await)
    }
}
