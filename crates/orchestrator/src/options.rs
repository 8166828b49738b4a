use std::sync::Arc;

use tm_agent::Connection;
use tm_domain::config::{Config, ToolErrorPolicy};
use tm_domain::{JsonMap, Schema, ToolDeclaration};
use tm_providers::ChatConfig;

/// Produces arguments merged into every dispatched call the model left
/// them out of.
pub type DefaultArgs = Arc<dyn Fn() -> JsonMap + Send + Sync>;

/// Per-session settings.  Built from `[session]` / `[llm]` and adjusted
/// with the builder methods.
#[derive(Clone)]
pub struct SessionOptions {
    pub model: String,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub thinking_budget: Option<i32>,
    pub system_instruction: Option<String>,
    /// JSON-only replies.  No tools are declared in this mode.
    pub json_output: bool,
    pub response_schema: Option<Schema>,
    /// Prefer tools served by this process over same-named registry entries.
    pub use_local_tool: bool,
    pub tool_error_policy: ToolErrorPolicy,
    /// Model round-trips allowed per `send_text`.
    pub max_turns: usize,
    pub default_args: Option<DefaultArgs>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl std::fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("model", &self.model)
            .field("json_output", &self.json_output)
            .field("use_local_tool", &self.use_local_tool)
            .field("tool_error_policy", &self.tool_error_policy)
            .field("max_turns", &self.max_turns)
            .field("default_args", &self.default_args.is_some())
            .finish_non_exhaustive()
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        let s = &config.session;
        Self {
            model: config.llm.default_model.clone(),
            temperature: Some(s.temperature),
            top_p: Some(s.top_p),
            max_output_tokens: Some(s.max_output_tokens),
            thinking_budget: None,
            system_instruction: None,
            json_output: false,
            response_schema: None,
            use_local_tool: s.use_local_tool,
            tool_error_policy: s.tool_error_policy,
            max_turns: s.max_turns,
            default_args: None,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.top_p = Some(p);
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.max_output_tokens = Some(n);
        self
    }

    pub fn thinking_budget(mut self, n: i32) -> Self {
        self.thinking_budget = Some(n);
        self
    }

    pub fn system_instruction(mut self, text: impl Into<String>) -> Self {
        self.system_instruction = Some(text.into());
        self
    }

    pub fn json_output(mut self, on: bool) -> Self {
        self.json_output = on;
        self
    }

    pub fn response_schema(mut self, schema: Schema) -> Self {
        self.response_schema = Some(schema);
        self
    }

    /// JSON output shaped like the response of the local tool `name`.  An
    /// unknown tool still enables JSON output, without a schema.
    pub fn tool_json_output(mut self, conn: &Connection, name: &str) -> Self {
        self.json_output = true;
        self.response_schema = conn.tool(name).map(|t| t.response_schema().render());
        self
    }

    pub fn use_local_tool(mut self, on: bool) -> Self {
        self.use_local_tool = on;
        self
    }

    pub fn tool_error_policy(mut self, policy: ToolErrorPolicy) -> Self {
        self.tool_error_policy = policy;
        self
    }

    pub fn max_turns(mut self, n: usize) -> Self {
        self.max_turns = n;
        self
    }

    pub fn default_args<F>(mut self, f: F) -> Self
    where
        F: Fn() -> JsonMap + Send + Sync + 'static,
    {
        self.default_args = Some(Arc::new(f));
        self
    }

    pub(crate) fn chat_config(&self, tools: Vec<ToolDeclaration>) -> ChatConfig {
        ChatConfig {
            model: self.model.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            max_output_tokens: self.max_output_tokens,
            thinking_budget: self.thinking_budget,
            system_instruction: self.system_instruction.clone(),
            tools: if self.json_output { Vec::new() } else { tools },
            json_output: self.json_output,
            response_schema: if self.json_output { self.response_schema.clone() } else { None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_session_config() {
        let o = SessionOptions::default();
        assert_eq!(o.model, "gemini-2.5-pro");
        assert_eq!(o.temperature, Some(0.2));
        assert_eq!(o.top_p, Some(0.95));
        assert_eq!(o.max_output_tokens, Some(8_192));
        assert_eq!(o.max_turns, 25);
        assert!(!o.use_local_tool);
        assert_eq!(o.tool_error_policy, ToolErrorPolicy::Abort);
    }

    #[test]
    fn json_output_drops_tools_from_chat_config() {
        let tools = vec![ToolDeclaration::new("add", "")];
        let c = SessionOptions::default().chat_config(tools.clone());
        assert_eq!(c.tools.len(), 1);
        let c = SessionOptions::default().json_output(true).chat_config(tools);
        assert!(c.tools.is_empty());
        assert!(c.json_output);
    }
}
