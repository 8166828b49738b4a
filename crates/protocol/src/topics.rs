//! Fixed topic names.  Tool invocation topics live under their own
//! namespace so a tool can never shadow a control topic.

pub const REGISTER: &str = "toolmesh:tool:register";
pub const UNREGISTER: &str = "toolmesh:tool:unregister";
pub const LIST: &str = "toolmesh:tool:list";
pub const KEEPALIVE: &str = "toolmesh:tool:keepalive";

const USER_FUNC_PREFIX: &str = "toolmesh:user-func:";

/// Invocation topic for the tool called `name`.
pub fn tool_topic(name: &str) -> String {
    format!("{USER_FUNC_PREFIX}{name}")
}

/// Inverse of [`tool_topic`].
pub fn tool_name(topic: &str) -> Option<&str> {
    topic.strip_prefix(USER_FUNC_PREFIX)
}
