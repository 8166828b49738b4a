//! `tm-providers` — the model-client boundary.
//!
//! [`ChatModel`] starts a conversation and [`ChatSession`] carries it one
//! turn at a time: text and function responses go in, ordered text and
//! function-call parts come out together with a finish reason.

pub mod google;
pub mod scripted;
pub mod traits;
pub mod util;

pub use google::GoogleModel;
pub use scripted::ScriptedModel;
pub use traits::{ChatConfig, ChatModel, ChatSession};

use std::sync::Arc;

use tm_domain::config::LlmConfig;
use tm_domain::error::{Error, Result};

/// Build the model client named by `[llm].provider`.
pub fn from_config(cfg: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match cfg.provider.as_str() {
        "google" | "gemini" => Ok(Arc::new(GoogleModel::from_config(cfg)?)),
        other => Err(Error::Config(format!("unknown llm provider '{other}'"))),
    }
}
