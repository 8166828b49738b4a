//! Invocation wrapper shared by the bus subscription and the in-process
//! shortcut.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tm_domain::{Error, JsonMap, Result, ERROR_KEY};

use crate::context::ReqCtx;
use crate::tool::{Tool, ToolError};

/// Run `tool` on `args` and produce the wire response.
///
/// A failing or panicking handler yields a response holding only `_error`;
/// nothing else from the handler leaks through.
pub async fn handle_tool_call(tool: &Tool, args: JsonMap) -> JsonMap {
    let ctx = ReqCtx::new(&tool.name, args, tool.parameters.properties.clone());
    let outcome = AssertUnwindSafe(tool.handler.call(ctx)).catch_unwind().await;

    let err = match outcome {
        Ok(Ok(response)) => return response,
        Ok(Err(e)) => e,
        Err(panic) => ToolError::Panicked(panic_message(panic.as_ref())),
    };

    tracing::warn!(tool = %tool.name, error = %err, "tool handler failed");
    if let Some(hook) = &tool.on_error {
        hook(&tool.name, &err);
    }
    JsonMap::from_error(err.to_string())
}

/// Convert an `_error`-bearing response into a hard [`Error::Tool`].
pub fn into_tool_result(name: &str, mut response: JsonMap) -> Result<JsonMap> {
    match response.error() {
        Some(message) => {
            response.remove(ERROR_KEY);
            Err(Error::Tool {
                name: name.to_string(),
                message,
            })
        }
        None => Ok(response),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".into()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::tool::handler_fn;

    fn divide() -> Tool {
        Tool::new(
            "divide",
            "a / b",
            handler_fn(|ctx: ReqCtx| async move {
                let b = ctx.int("b");
                if b == 0 {
                    return Err(ToolError::Failed("division by zero".into()));
                }
                Ok(JsonMap::new().with("result", ctx.int("a") / b).with("extra", true))
            }),
        )
    }

    #[tokio::test]
    async fn success_passes_through_verbatim() {
        let resp = handle_tool_call(&divide(), JsonMap::new().with("a", 9).with("b", 3)).await;
        assert_eq!(resp, JsonMap::new().with("result", 3).with("extra", true));
    }

    #[tokio::test]
    async fn failure_yields_only_the_error_field() {
        let resp = handle_tool_call(&divide(), JsonMap::new().with("a", 1).with("b", 0)).await;
        assert_eq!(resp.len(), 1);
        assert_eq!(resp.error().as_deref(), Some("failed: division by zero"));
    }

    #[tokio::test]
    async fn error_hook_observes_failures() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let tool = divide().on_error(move |name, _err| {
            assert_eq!(name, "divide");
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handle_tool_call(&tool, JsonMap::new().with("b", 0)).await;
        handle_tool_call(&tool, JsonMap::new().with("b", 1)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panics_are_contained() {
        let tool = Tool::new(
            "explode",
            "",
            handler_fn(|_ctx: ReqCtx| async move {
                if true {
                    panic!("kaboom");
                }
                Ok(JsonMap::new())
            }),
        );
        let resp = handle_tool_call(&tool, JsonMap::new()).await;
        assert_eq!(resp.error().as_deref(), Some("panicked: kaboom"));
    }

    #[test]
    fn error_field_becomes_tool_error() {
        let err = into_tool_result("divide", JsonMap::from_error("nope")).unwrap_err();
        assert!(matches!(err, Error::Tool { ref name, ref message } if name == "divide" && message == "nope"));
        let ok = into_tool_result("divide", JsonMap::new().with("result", 1)).unwrap();
        assert_eq!(ok.int("result", 0), 1);
    }
}
