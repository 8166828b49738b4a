//! Deterministic model for tests: replays canned replies and records what
//! it was sent.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tm_domain::content::{Content, FinishReason, ModelResponse, Part, Role, Usage};
use tm_domain::error::{Error, Result};

use crate::traits::{ChatConfig, ChatModel, ChatSession};

#[derive(Default)]
struct Script {
    replies: VecDeque<ModelResponse>,
    requests: Vec<Vec<Part>>,
    configs: Vec<ChatConfig>,
}

/// A [`ChatModel`] whose every chat pops replies from one shared queue.
#[derive(Clone, Default)]
pub struct ScriptedModel {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new(replies: impl IntoIterator<Item = ModelResponse>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                replies: replies.into_iter().collect(),
                ..Default::default()
            })),
            delay: None,
        }
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_reply(&self, reply: ModelResponse) {
        self.script.lock().replies.push_back(reply);
    }

    /// Every batch of parts sent so far, across all chats.
    pub fn requests(&self) -> Vec<Vec<Part>> {
        self.script.lock().requests.clone()
    }

    /// Configuration of every chat started so far.
    pub fn configs(&self) -> Vec<ChatConfig> {
        self.script.lock().configs.clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().replies.len()
    }
}

#[async_trait::async_trait]
impl ChatModel for ScriptedModel {
    async fn start_chat(&self, config: ChatConfig) -> Result<Box<dyn ChatSession>> {
        self.script.lock().configs.push(config);
        Ok(Box::new(ScriptedChat {
            model: self.clone(),
            history: Vec::new(),
        }))
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

struct ScriptedChat {
    model: ScriptedModel,
    history: Vec<Content>,
}

#[async_trait::async_trait]
impl ChatSession for ScriptedChat {
    async fn send(&mut self, parts: Vec<Part>) -> Result<ModelResponse> {
        if let Some(d) = self.model.delay {
            tokio::time::sleep(d).await;
        }
        let reply = {
            let mut script = self.model.script.lock();
            script.requests.push(parts.clone());
            script.replies.pop_front()
        };
        let reply = reply.ok_or_else(|| Error::Provider {
            provider: "scripted".into(),
            message: "script exhausted".into(),
        })?;
        self.history.push(Content { role: Role::User, parts });
        self.history.push(Content {
            role: Role::Model,
            parts: reply.parts.clone(),
        });
        Ok(reply)
    }

    fn history(&self) -> &[Content] {
        &self.history
    }
}

/// A reply that carries usage metadata, so the session keeps going.
pub fn reply(parts: Vec<Part>) -> ModelResponse {
    ModelResponse {
        parts,
        finish_reason: Some(FinishReason::Stop),
        usage: Some(Usage {
            prompt_tokens: 1,
            completion_tokens: 1,
            total_tokens: 2,
        }),
    }
}

/// A reply without usage metadata.
pub fn final_reply(parts: Vec<Part>) -> ModelResponse {
    ModelResponse {
        parts,
        finish_reason: Some(FinishReason::Stop),
        usage: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_order_and_records_requests() {
        let model = ScriptedModel::new([reply(vec![Part::text("one")]), reply(vec![Part::text("two")])]);
        let mut chat = model.start_chat(ChatConfig::default()).await.unwrap();

        assert_eq!(chat.send(vec![Part::text("a")]).await.unwrap().text(), "one");
        assert_eq!(chat.send(vec![Part::text("b")]).await.unwrap().text(), "two");
        assert!(chat.send(vec![Part::text("c")]).await.is_err());

        assert_eq!(model.requests().len(), 3);
        assert_eq!(chat.history().len(), 4);
        assert_eq!(model.configs().len(), 1);
    }
}
