use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider (OpenAI-compatible)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Identifier used in logs and error messages.
    #[serde(default = "d_provider_id")]
    pub provider_id: String,
    /// Base URL of the chat completions API (without `/chat/completions`).
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// API key. Usually supplied through `OPENAI_API_KEY` rather than the file.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Chat model used by both agents unless overridden.
    #[serde(default = "d_model")]
    pub model: String,
    /// Embedding model used for retrieval and the connectivity probe.
    #[serde(default = "d_embedding_model")]
    pub embedding_model: String,
    /// Sampling temperature. `None` lets the provider choose.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Whole-request timeout for non-streaming calls and stream setup.
    #[serde(default = "d_120000")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider_id: d_provider_id(),
            base_url: d_base_url(),
            api_key: None,
            model: d_model(),
            embedding_model: d_embedding_model(),
            temperature: None,
            timeout_ms: 120_000,
        }
    }
}

fn d_provider_id() -> String {
    "openai".into()
}

fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn d_model() -> String {
    "gpt-4o-mini".into()
}

fn d_embedding_model() -> String {
    "text-embedding-3-small".into()
}

fn d_120000() -> u64 {
    120_000
}
