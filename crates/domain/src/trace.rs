use serde::Serialize;

/// Structured trace events emitted across all kbagent crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    LlmRequest {
        provider: String,
        model: String,
        streaming: bool,
        duration_ms: u64,
    },
    VectorStoreCall {
        endpoint: String,
        status: u16,
        duration_ms: u64,
    },
    ToolCalled {
        tool: String,
        is_error: bool,
        duration_ms: u64,
    },
    TurnCommitted {
        session_id: String,
        history_len: usize,
        failed: bool,
    },
    TranscriptAppend {
        session_id: String,
        lines: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "ka_event");
    }
}
