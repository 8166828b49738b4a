use tm_domain::content::{Content, ModelResponse, Part};
use tm_domain::error::Result;
use tm_domain::{Schema, ToolDeclaration};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything fixed for the lifetime of one conversation.
#[derive(Debug, Clone, Default)]
pub struct ChatConfig {
    /// Model identifier.  Empty lets the provider use its default.
    pub model: String,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
    /// Reasoning token budget, for models that support one.
    pub thinking_budget: Option<i32>,
    pub system_instruction: Option<String>,
    /// Functions the model may call.  Always empty when `json_output` is set.
    pub tools: Vec<ToolDeclaration>,
    /// Ask for a single JSON document as the reply.
    pub json_output: bool,
    /// Schema the JSON reply must satisfy.
    pub response_schema: Option<Schema>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model client traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A generative model that can hold multi-turn, tool-using chats.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    async fn start_chat(&self, config: ChatConfig) -> Result<Box<dyn ChatSession>>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}

/// One conversation.  The session owns the history; each `send` appends
/// the outgoing user turn and the model's reply.
#[async_trait::async_trait]
pub trait ChatSession: Send {
    /// Send text and/or function responses and wait for the next reply.
    async fn send(&mut self, parts: Vec<Part>) -> Result<ModelResponse>;

    fn history(&self) -> &[Content];
}
