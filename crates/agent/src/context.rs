//! Typed view over an inbound call's untyped argument map.

use tm_domain::schema::{Properties, SchemaNode};
use tm_domain::JsonMap;

use crate::tool::ToolError;

/// Accessor context handed to a [`ToolHandler`](crate::ToolHandler).
///
/// Every accessor is total.  A missing or mistyped argument falls back to
/// the default declared in the tool's parameter schema, then to the zero
/// value of the type.
#[derive(Debug, Clone)]
pub struct ReqCtx {
    tool: String,
    args: JsonMap,
    schema: Properties,
}

impl ReqCtx {
    pub fn new(tool: impl Into<String>, args: JsonMap, schema: Properties) -> Self {
        Self {
            tool: tool.into(),
            args,
            schema,
        }
    }

    pub fn tool_name(&self) -> &str {
        &self.tool
    }

    pub fn args(&self) -> &JsonMap {
        &self.args
    }

    pub fn into_args(self) -> JsonMap {
        self.args
    }

    pub fn has(&self, key: &str) -> bool {
        self.args.contains_key(key)
    }

    /// Fail with `InvalidArgs` unless `key` was supplied.
    pub fn require(&self, key: &str) -> Result<(), ToolError> {
        if self.has(key) {
            Ok(())
        } else {
            Err(ToolError::InvalidArgs(format!("missing argument `{key}`")))
        }
    }

    pub fn int(&self, key: &str) -> i64 {
        let default = match self.schema.get(key) {
            Some(SchemaNode::Int(s)) => s.default.unwrap_or(0),
            Some(SchemaNode::Float(s)) => s.default.map(|f| f as i64).unwrap_or(0),
            _ => 0,
        };
        self.args.int(key, default)
    }

    pub fn float(&self, key: &str) -> f64 {
        let default = match self.schema.get(key) {
            Some(SchemaNode::Float(s)) => s.default.unwrap_or(0.0),
            Some(SchemaNode::Int(s)) => s.default.map(|i| i as f64).unwrap_or(0.0),
            _ => 0.0,
        };
        self.args.float(key, default)
    }

    pub fn string(&self, key: &str) -> String {
        let default = match self.schema.get(key) {
            Some(SchemaNode::String(s)) => s.default.as_deref().unwrap_or_default(),
            _ => "",
        };
        self.args.string(key, default)
    }

    pub fn bool(&self, key: &str) -> bool {
        let default = match self.schema.get(key) {
            Some(SchemaNode::Bool(s)) => s.default.unwrap_or(false),
            _ => false,
        };
        self.args.bool(key, default)
    }

    pub fn int_array(&self, key: &str) -> Vec<i64> {
        self.args.int_array(key, &[])
    }

    pub fn float_array(&self, key: &str) -> Vec<f64> {
        self.args.float_array(key, &[])
    }

    pub fn string_array(&self, key: &str) -> Vec<String> {
        self.args.string_array(key, &[])
    }

    pub fn bool_array(&self, key: &str) -> Vec<bool> {
        self.args.bool_array(key, &[])
    }

    /// Nested object, typed by the child schema when one is declared.
    pub fn object(&self, key: &str) -> ReqCtx {
        let schema = match self.schema.get(key) {
            Some(SchemaNode::Object(o)) => o.properties.clone(),
            _ => Properties::new(),
        };
        ReqCtx {
            tool: self.tool.clone(),
            args: self.args.object(key).unwrap_or_default(),
            schema,
        }
    }

    pub fn object_array(&self, key: &str) -> Vec<ReqCtx> {
        let schema = match self.schema.get(key) {
            Some(SchemaNode::ObjectArray(o)) => o.items.clone(),
            _ => Properties::new(),
        };
        self.args
            .object_array(key, &[])
            .into_iter()
            .map(|args| ReqCtx {
                tool: self.tool.clone(),
                args,
                schema: schema.clone(),
            })
            .collect()
    }
}
