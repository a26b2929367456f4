use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Interactive chat (knowledge-base agent)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Banner shown when the chat starts; also names the knowledge base in
    /// the default system prompt.
    #[serde(default = "d_title")]
    pub title: String,
    /// Hint printed under the banner.
    #[serde(default = "d_input_hint")]
    pub input_hint: String,
    /// Replaces the built-in knowledge-base system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// How many times a tool may ask the model to retry before the turn fails.
    #[serde(default = "d_2")]
    pub max_tool_retries: u32,
    /// Maximum wait for the next streamed delta. `None` waits forever.
    #[serde(default)]
    pub stream_idle_timeout_ms: Option<u64>,
    /// Readline history file. Defaults to `~/.kbagent/chat_history.txt`.
    #[serde(default)]
    pub history_file: Option<PathBuf>,
    /// When set, every committed turn is appended to
    /// `<transcript_dir>/<session_id>.jsonl`.
    #[serde(default)]
    pub transcript_dir: Option<PathBuf>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            title: d_title(),
            input_hint: d_input_hint(),
            system_prompt: None,
            max_tool_retries: 2,
            stream_idle_timeout_ms: None,
            history_file: None,
            transcript_dir: None,
        }
    }
}

fn d_title() -> String {
    "University of Akureyri Knowledge Base".into()
}

fn d_input_hint() -> String {
    "Ask me about UNAK".into()
}

fn d_2() -> u32 {
    2
}
