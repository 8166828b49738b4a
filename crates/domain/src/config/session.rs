use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrated sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    #[serde(default = "d_top_p")]
    pub top_p: f32,
    #[serde(default = "d_8192")]
    pub max_output_tokens: u32,
    /// Upper bound on model round-trips for one `send_text`.
    #[serde(default = "d_25")]
    pub max_turns: usize,
    /// Prefer in-process tools over registry entries with the same name.
    #[serde(default)]
    pub use_local_tool: bool,
    #[serde(default)]
    pub tool_error_policy: ToolErrorPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.95,
            max_output_tokens: 8_192,
            max_turns: 25,
            use_local_tool: false,
            tool_error_policy: ToolErrorPolicy::default(),
        }
    }
}

/// What a session does with a tool response that carries `_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorPolicy {
    /// Treat it as a failed call and abort the session.
    #[default]
    Abort,
    /// Hand the error payload to the model as the function result.
    ReportToModel,
}

fn d_temperature() -> f32 {
    0.2
}

fn d_top_p() -> f32 {
    0.95
}

fn d_8192() -> u32 {
    8_192
}

fn d_25() -> usize {
    25
}
