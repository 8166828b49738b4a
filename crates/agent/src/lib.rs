//! `tm-agent` — the agent side of the tool mesh.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tm_agent::{handler_fn, Connection, ConnectionOptions, ReqCtx, Tool};
//! use tm_bus::LocalBus;
//! use tm_domain::schema::{int, object};
//! use tm_domain::JsonMap;
//!
//! # async fn run() -> tm_domain::Result<()> {
//! let conn = Connection::new(Arc::new(LocalBus::new()), ConnectionOptions::default());
//! conn.register_tool(
//!     Tool::new("add", "adds two integers", handler_fn(|ctx: ReqCtx| async move {
//!         Ok(JsonMap::new().with("result", ctx.int("a") + ctx.int("b")))
//!     }))
//!     .parameters(object("operands").property("a", int("a")).property("b", int("b"))),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! A tool is served on `toolmesh:user-func:<name>`.  Handler failures are
//! returned in-band as `{"_error": "..."}` so callers can tell a tool that
//! ran and declined from one that could not be reached.

pub mod call;
pub mod caller;
pub mod connection;
pub mod context;
pub mod tool;

pub use call::{handle_tool_call, into_tool_result};
pub use caller::{FunctionCaller, NoTools};
pub use connection::{Connection, ConnectionOptions};
pub use context::ReqCtx;
pub use tool::{handler_fn, ErrorHook, FnHandler, Tool, ToolError, ToolHandler, ToolResult};
