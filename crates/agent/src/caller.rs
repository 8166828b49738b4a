use async_trait::async_trait;
use tm_domain::{Error, JsonMap, Result, ToolDeclaration};

/// What an orchestrated session needs from the tool mesh.
#[async_trait]
pub trait FunctionCaller: Send + Sync {
    /// Declarations currently live in the registry.
    async fn list_tools(&self) -> Result<Vec<ToolDeclaration>>;

    /// Declarations of tools served by this process.
    fn local_tools(&self) -> Vec<ToolDeclaration> {
        Vec::new()
    }

    /// Invoke `name` over the bus.  The raw response is returned, so an
    /// `_error` field is left for the caller to interpret.
    async fn call_function(&self, name: &str, args: JsonMap) -> Result<JsonMap>;

    /// Invoke a locally served tool in-process, if there is one.
    async fn call_local(&self, _name: &str, _args: JsonMap) -> Option<JsonMap> {
        None
    }
}

/// A mesh with no tools.  Every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTools;

#[async_trait]
impl FunctionCaller for NoTools {
    async fn list_tools(&self) -> Result<Vec<ToolDeclaration>> {
        Ok(Vec::new())
    }

    async fn call_function(&self, name: &str, _args: JsonMap) -> Result<JsonMap> {
        Err(Error::Tool {
            name: name.to_string(),
            message: "no tools are available in this session".into(),
        })
    }
}
