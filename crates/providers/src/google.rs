//! Google Gemini adapter.
//!
//! Implements chat over the Gemini `generateContent` API.  Auth is via an
//! API key passed as a query parameter (`key={api_key}`).  History is kept
//! client-side and resent on every turn.

use std::time::Duration;

use serde_json::{json, Map, Value};
use tm_domain::config::LlmConfig;
use tm_domain::content::{Content, FinishReason, FunctionCall, ModelResponse, Part, Role, Usage};
use tm_domain::error::{Error, Result};
use tm_domain::{JsonMap, ToolDeclaration};

use crate::traits::{ChatConfig, ChatModel, ChatSession};
use crate::util::{from_reqwest, redact_url_key, resolve_api_key};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct GoogleModel {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl GoogleModel {
    /// Build from the `[llm]` section, reading the key from `api_key_env`.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.api_key_env)?;
        Self::new(cfg, api_key)
    }

    pub fn new(cfg: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.provider.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            default_model: cfg.default_model.clone(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl ChatModel for GoogleModel {
    async fn start_chat(&self, config: ChatConfig) -> Result<Box<dyn ChatSession>> {
        let model = if config.model.is_empty() {
            self.default_model.clone()
        } else {
            config.model.clone()
        };
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );
        tracing::debug!(provider = %self.id, model = %model, tools = config.tools.len(), "starting gemini chat");
        Ok(Box::new(GoogleChat {
            provider: self.id.clone(),
            url,
            client: self.client.clone(),
            config,
            history: Vec::new(),
        }))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct GoogleChat {
    provider: String,
    url: String,
    client: reqwest::Client,
    config: ChatConfig,
    history: Vec<Content>,
}

impl GoogleChat {
    async fn post(&self, body: &Value) -> Result<ModelResponse> {
        tracing::debug!(provider = %self.provider, url = %redact_url_key(&self.url), "gemini generateContent");

        let resp = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;
        if !status.is_success() {
            return Err(Error::Provider {
                provider: self.provider.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), resp_text),
            });
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        parse_response(&self.provider, &resp_json)
    }
}

#[async_trait::async_trait]
impl ChatSession for GoogleChat {
    async fn send(&mut self, parts: Vec<Part>) -> Result<ModelResponse> {
        self.history.push(Content { role: Role::User, parts });
        let body = build_body(&self.config, &self.history);

        let response = match self.post(&body).await {
            Ok(r) => r,
            Err(e) => {
                // The failed turn never happened.
                self.history.pop();
                return Err(e);
            }
        };
        self.history.push(Content {
            role: Role::Model,
            parts: response.parts.clone(),
        });
        Ok(response)
    }

    fn history(&self) -> &[Content] {
        &self.history
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request serialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn build_body(config: &ChatConfig, history: &[Content]) -> Value {
    let contents: Vec<Value> = history.iter().map(content_to_gemini).collect();
    let mut body = json!({ "contents": contents });

    if let Some(si) = &config.system_instruction {
        body["systemInstruction"] = json!({ "parts": [{ "text": si }] });
    }

    if !config.json_output && !config.tools.is_empty() {
        let declarations: Vec<Value> = config.tools.iter().map(tool_to_gemini).collect();
        body["tools"] = json!([{ "functionDeclarations": declarations }]);
        body["toolConfig"] = json!({ "functionCallingConfig": { "mode": "AUTO" } });
    }

    let mut gen = Map::new();
    if let Some(t) = config.temperature {
        gen.insert("temperature".into(), json!(t));
    }
    if let Some(p) = config.top_p {
        gen.insert("topP".into(), json!(p));
    }
    if let Some(max) = config.max_output_tokens {
        gen.insert("maxOutputTokens".into(), json!(max));
    }
    if let Some(budget) = config.thinking_budget {
        gen.insert("thinkingConfig".into(), json!({ "thinkingBudget": budget }));
    }
    if config.json_output {
        gen.insert("responseMimeType".into(), json!("application/json"));
        if let Some(schema) = &config.response_schema {
            gen.insert("responseSchema".into(), json!(schema));
        }
    }
    if !gen.is_empty() {
        body["generationConfig"] = Value::Object(gen);
    }

    body
}

fn content_to_gemini(content: &Content) -> Value {
    let role = match content.role {
        Role::User => "user",
        Role::Model => "model",
    };
    let parts: Vec<Value> = content.parts.iter().map(part_to_gemini).collect();
    json!({ "role": role, "parts": parts })
}

fn part_to_gemini(part: &Part) -> Value {
    match part {
        Part::Text { text } => json!({ "text": text }),
        Part::FunctionCall(fc) => json!({
            "functionCall": { "name": fc.name, "args": fc.args }
        }),
        Part::FunctionResponse(fr) => json!({
            "functionResponse": { "name": fr.name, "response": fr.response }
        }),
    }
}

fn tool_to_gemini(tool: &ToolDeclaration) -> Value {
    let mut decl = json!({
        "name": tool.name,
        "description": tool.description,
    });
    if let Some(p) = &tool.parameters {
        decl["parameters"] = json!(p);
    }
    if let Some(r) = &tool.response {
        decl["response"] = json!(r);
    }
    decl
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn parse_response(provider: &str, body: &Value) -> Result<ModelResponse> {
    let candidate = match body
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
    {
        Some(c) => c,
        None => {
            let reason = body
                .pointer("/promptFeedback/blockReason")
                .and_then(|v| v.as_str())
                .unwrap_or("no candidates in response");
            return Err(Error::Provider {
                provider: provider.to_string(),
                message: reason.to_string(),
            });
        }
    };

    let mut parts = Vec::new();
    if let Some(raw) = candidate.pointer("/content/parts").and_then(|p| p.as_array()) {
        for part in raw {
            if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
                // Thought summaries are not part of the answer.
                if part.get("thought").and_then(|v| v.as_bool()) == Some(true) {
                    continue;
                }
                parts.push(Part::text(text));
            } else if let Some(fc) = part.get("functionCall") {
                let name = fc.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
                let args = fc
                    .get("args")
                    .cloned()
                    .and_then(JsonMap::from_value)
                    .unwrap_or_default();
                parts.push(Part::FunctionCall(FunctionCall { name, args }));
            }
        }
    }

    let finish_reason = candidate
        .get("finishReason")
        .and_then(|v| v.as_str())
        .map(parse_finish_reason);

    let usage = body.get("usageMetadata").and_then(parse_usage);

    Ok(ModelResponse {
        parts,
        finish_reason,
        usage,
    })
}

fn parse_finish_reason(s: &str) -> FinishReason {
    match s {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::MaxTokens,
        "SAFETY" => FinishReason::Safety,
        "RECITATION" => FinishReason::Recitation,
        "MALFORMED_FUNCTION_CALL" => FinishReason::MalformedFunctionCall,
        other => FinishReason::Other(other.to_string()),
    }
}

fn parse_usage(v: &Value) -> Option<Usage> {
    let prompt = v.get("promptTokenCount")?.as_u64()? as u32;
    let completion = v
        .get("candidatesTokenCount")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;
    let total = v
        .get("totalTokenCount")
        .and_then(|v| v.as_u64())
        .unwrap_or((prompt + completion) as u64) as u32;
    Some(Usage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: total,
    })
}
