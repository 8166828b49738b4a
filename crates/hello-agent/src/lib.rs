//! Arithmetic tools served by the reference agent.

use tm_agent::{handler_fn, ReqCtx, Tool, ToolError};
use tm_domain::schema::{int, object, ObjectSchema};
use tm_domain::JsonMap;

fn operands() -> ObjectSchema {
    object("two integer operands")
        .property("a", int("first operand").required())
        .property("b", int("second operand").required())
}

fn result(description: &str) -> ObjectSchema {
    object(description).property("result", int(description))
}

pub fn add() -> Tool {
    Tool::new(
        "add",
        "Add two integers",
        handler_fn(|ctx: ReqCtx| async move {
            ctx.require("a")?;
            ctx.require("b")?;
            let sum = ctx
                .int("a")
                .checked_add(ctx.int("b"))
                .ok_or_else(|| ToolError::Failed("integer overflow".into()))?;
            Ok(JsonMap::new().with("result", sum))
        }),
    )
    .parameters(operands())
    .response(result("a + b"))
}

pub fn multiply() -> Tool {
    Tool::new(
        "multiply",
        "Multiply two integers",
        handler_fn(|ctx: ReqCtx| async move {
            ctx.require("a")?;
            ctx.require("b")?;
            let product = ctx
                .int("a")
                .checked_mul(ctx.int("b"))
                .ok_or_else(|| ToolError::Failed("integer overflow".into()))?;
            Ok(JsonMap::new().with("result", product))
        }),
    )
    .parameters(operands())
    .response(result("a * b"))
}

pub fn tools() -> Vec<Tool> {
    vec![add(), multiply()]
}
