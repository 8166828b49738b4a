//! `tm-orchestrator` — drives a model conversation over the tool mesh.
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # async fn run(model: Arc<dyn tm_providers::ChatModel>, conn: Arc<tm_agent::Connection>) -> tm_domain::Result<()> {
//! use tm_orchestrator::{Session, SessionOptions};
//!
//! let session = Session::create(model.as_ref(), conn, SessionOptions::default()).await?;
//! let mut text = session.send_text("what is 35 + 21?");
//! while let Some(fragment) = text.next_text().await {
//!     print!("{}", fragment?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod options;
pub mod session;
pub mod stream;
mod turn;

pub use options::{DefaultArgs, SessionOptions};
pub use session::{generate, generate_json, JsonSession, Session};
pub use stream::TextStream;
