use std::sync::Arc;

use tm_agent::{FunctionCaller, NoTools};
use tm_domain::config::ToolErrorPolicy;
use tm_domain::content::Part;
use tm_domain::schema::{object, string, SchemaNode};
use tm_domain::{Error, JsonMap, Result, ToolDeclaration, ERROR_KEY};
use tm_providers::{ChatModel, ChatSession};
use tokio::sync::Mutex;

use crate::options::SessionOptions;
use crate::stream::{self, TextStream};
use crate::turn;

/// One conversation between a model and the tool mesh.
///
/// `send_text` calls are serialised: a second call waits until the
/// previous turn loop has finished with the chat.
pub struct Session {
    chat: Arc<Mutex<Box<dyn ChatSession>>>,
    caller: Arc<dyn FunctionCaller>,
    options: Arc<SessionOptions>,
    tools: Vec<ToolDeclaration>,
}

impl Session {
    /// Resolve the visible tool set and start a chat with it.
    pub async fn create(
        model: &dyn ChatModel,
        caller: Arc<dyn FunctionCaller>,
        options: SessionOptions,
    ) -> Result<Self> {
        if options.max_turns == 0 {
            return Err(Error::Config("max_turns must allow at least one turn".into()));
        }
        let tools = visible_tools(caller.as_ref(), &options).await?;
        tracing::info!(
            provider = model.provider_id(),
            model = %options.model,
            tools = tools.len(),
            json_output = options.json_output,
            "session created"
        );
        let chat = model.start_chat(options.chat_config(tools.clone())).await?;
        Ok(Self {
            chat: Arc::new(Mutex::new(chat)),
            caller,
            options: Arc::new(options),
            tools,
        })
    }

    /// Declarations handed to the model.
    pub fn tools(&self) -> &[ToolDeclaration] {
        &self.tools
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn send_text(&self, text: impl Into<String>) -> TextStream {
        self.send_parts(vec![Part::text(text)])
    }

    /// Start the turn loop for `parts` on a background task.
    pub fn send_parts(&self, parts: Vec<Part>) -> TextStream {
        let (sink, stream) = stream::channel();
        let chat = self.chat.clone();
        let caller = self.caller.clone();
        let options = self.options.clone();

        tokio::spawn(async move {
            let mut chat = chat.lock_owned().await;
            if let Err(e) = turn::run(chat.as_mut(), caller, options, parts, &sink).await {
                tracing::warn!(error = %e, "session aborted");
                sink.emit(Err(e)).await;
            }
        });
        stream
    }
}

async fn visible_tools(caller: &dyn FunctionCaller, options: &SessionOptions) -> Result<Vec<ToolDeclaration>> {
    if options.json_output {
        return Ok(Vec::new());
    }

    let mut tools = caller.list_tools().await?;
    if options.use_local_tool {
        let local = caller.local_tools();
        tools.retain(|remote| !local.iter().any(|l| l.name == remote.name));
        tools.extend(local);
    }

    if options.tool_error_policy == ToolErrorPolicy::ReportToModel {
        for tool in &mut tools {
            declare_error_field(tool);
        }
    }
    Ok(tools)
}

/// Let the model know a function result may carry `_error`.
fn declare_error_field(tool: &mut ToolDeclaration) {
    let field = SchemaNode::from(string("Error details for failed function call").nullable(true)).render();
    let response = tool
        .response
        .get_or_insert_with(|| object(format!("Result of {}", tool.name)).render());
    response.properties.entry(ERROR_KEY.to_string()).or_insert(field);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool-less generation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A session with no tool mesh.  A function call from the model fails it.
pub async fn generate(model: &dyn ChatModel, options: SessionOptions) -> Result<Session> {
    Session::create(model, Arc::new(NoTools), options).await
}

/// JSON-mode generator built by [`generate_json`].
pub struct JsonSession {
    session: Session,
}

impl JsonSession {
    /// Send `prompt` and decode the first text fragment of the reply.
    pub async fn generate(&self, prompt: impl Into<String>) -> Result<JsonMap> {
        let mut stream = self.session.send_text(prompt);
        match stream.next_text().await {
            Some(Ok(text)) => serde_json::from_str(&text).map_err(|e| Error::Decode(e.to_string())),
            Some(Err(e)) => Err(e),
            None => Err(Error::Decode("model returned no text".into())),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

pub async fn generate_json(model: &dyn ChatModel, options: SessionOptions) -> Result<JsonSession> {
    if !options.json_output {
        return Err(Error::Config("generate_json requires json_output".into()));
    }
    Ok(JsonSession {
        session: generate(model, options).await?,
    })
}
