//! Tool definitions: handler trait, handler errors, and the declaration a
//! tool advertises to the registry.

use std::future::Future;
use std::sync::Arc;

use tm_domain::schema::ObjectSchema;
use tm_domain::{JsonMap, ToolDeclaration};

use crate::context::ReqCtx;

/// Result type for tool handlers.
pub type ToolResult = Result<JsonMap, ToolError>;

/// Errors a tool handler can return.
///
/// The call wrapper renders these into the reserved `_error` field of an
/// otherwise empty response.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("invalid_args: {0}")]
    InvalidArgs(String),
    #[error("failed: {0}")]
    Failed(String),
    #[error("panicked: {0}")]
    Panicked(String),
}

/// Observer invoked with every handler failure.  It cannot change the
/// response.
pub type ErrorHook = Arc<dyn Fn(&str, &ToolError) + Send + Sync>;

/// Implement this trait to serve a tool.
///
/// ```rust,no_run
/// use tm_agent::{ReqCtx, ToolHandler, ToolResult};
/// use tm_domain::JsonMap;
///
/// struct Add;
///
/// #[async_trait::async_trait]
/// impl ToolHandler for Add {
///     async fn call(&self, ctx: ReqCtx) -> ToolResult {
///         Ok(JsonMap::new().with("result", ctx.int("a") + ctx.int("b")))
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + 'static {
    async fn call(&self, ctx: ReqCtx) -> ToolResult;
}

/// Adapter turning an async closure into a [`ToolHandler`].
pub struct FnHandler<F>(F);

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(ReqCtx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ToolResult> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait::async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(ReqCtx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ToolResult> + Send + 'static,
{
    async fn call(&self, ctx: ReqCtx) -> ToolResult {
        (self.0)(ctx).await
    }
}

/// A named, schema-described function served by this process.
#[derive(Clone)]
pub struct Tool {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) parameters: ObjectSchema,
    pub(crate) response: ObjectSchema,
    pub(crate) handler: Arc<dyn ToolHandler>,
    pub(crate) on_error: Option<ErrorHook>,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, handler: impl ToolHandler) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ObjectSchema::default(),
            response: ObjectSchema::default(),
            handler: Arc::new(handler),
            on_error: None,
        }
    }

    pub fn parameters(mut self, schema: ObjectSchema) -> Self {
        self.parameters = schema;
        self
    }

    pub fn response(mut self, schema: ObjectSchema) -> Self {
        self.response = schema;
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &ToolError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_schema(&self) -> &ObjectSchema {
        &self.parameters
    }

    pub fn response_schema(&self) -> &ObjectSchema {
        &self.response
    }

    /// Rendered declaration.  A schema without properties is omitted.
    pub fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: render_if_present(&self.parameters),
            response: render_if_present(&self.response),
        }
    }
}

fn render_if_present(schema: &ObjectSchema) -> Option<tm_domain::Schema> {
    if schema.properties.is_empty() {
        None
    } else {
        Some(schema.render())
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_domain::schema::{int, object};

    fn add() -> Tool {
        Tool::new(
            "add",
            "adds two integers",
            handler_fn(|ctx: ReqCtx| async move { Ok(JsonMap::new().with("result", ctx.int("a") + ctx.int("b"))) }),
        )
        .parameters(
            object("operands")
                .property("a", int("left").required())
                .property("b", int("right").required()),
        )
        .response(object("sum").property("result", int("a + b")))
    }

    #[test]
    fn declaration_renders_both_schemas() {
        let decl = add().declaration();
        assert_eq!(decl.name, "add");
        let params = decl.parameters.unwrap();
        assert_eq!(params.required, vec!["a", "b"]);
        assert!(decl.response.unwrap().properties.contains_key("result"));
    }

    #[test]
    fn empty_schemas_are_omitted() {
        let tool = Tool::new("ping", "", handler_fn(|_ctx: ReqCtx| async { Ok(JsonMap::new()) }));
        let decl = tool.declaration();
        assert!(decl.parameters.is_none());
        assert!(decl.response.is_none());
    }

    #[test]
    fn error_display_carries_kind() {
        assert_eq!(ToolError::Failed("boom".into()).to_string(), "failed: boom");
        assert_eq!(ToolError::InvalidArgs("a".into()).to_string(), "invalid_args: a");
    }
}
