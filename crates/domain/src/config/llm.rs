use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Only `google` is built in.
    #[serde(default = "d_provider")]
    pub provider: String,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_model")]
    pub default_model: String,
    #[serde(default = "d_60")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: d_provider(),
            base_url: d_base_url(),
            api_key_env: d_api_key_env(),
            default_model: d_model(),
            timeout_secs: 60,
        }
    }
}

fn d_provider() -> String {
    "google".into()
}

fn d_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}

fn d_api_key_env() -> String {
    "GOOGLE_API_KEY".into()
}

fn d_model() -> String {
    "gemini-2.5-pro".into()
}

fn d_60() -> u64 {
    60
}
