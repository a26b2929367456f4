//! The agent contract and the tool-calling loop behind it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use tracing::Instrument;

use ka_domain::error::{Error, Result};
use ka_domain::stream::{BoxStream, StreamEvent, Usage};
use ka_domain::tool::{Message, ToolCall, ToolDefinition};
use ka_domain::trace::TraceEvent;
use ka_providers::{ChatRequest, LlmProvider};
use ka_sessions::AdaptedMessage;
use ka_tools::{Tool, ToolError};

/// Maximum number of model rounds in one run before we force-stop.
pub const MAX_TOOL_LOOPS: usize = 25;

/// Default number of retry prompts a single tool may trigger per run.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Something that answers a prompt as a stream of text deltas.
///
/// The stream is lazy: nothing is sent until it is first polled, and a
/// failure to connect arrives as its first `Err` item. It is finite and
/// cannot be restarted.
#[async_trait]
pub trait Agent<D: Sync>: Send + Sync {
    fn run_stream<'a>(
        &'a self,
        prompt: &'a str,
        deps: &'a D,
        history: Vec<AdaptedMessage>,
    ) -> BoxStream<'a, Result<String>>;

    /// Run to completion and return the concatenated text.
    async fn run(&self, prompt: &str, deps: &D, history: Vec<AdaptedMessage>) -> Result<String> {
        let mut stream = self.run_stream(prompt, deps, history);
        let mut out = String::new();
        while let Some(delta) = stream.next().await {
            out.push_str(&delta?);
        }
        Ok(out)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolAgent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An agent that streams a chat model and runs the tools it asks for
/// until the model answers without calling any.
pub struct ToolAgent<D: Sync> {
    provider: Arc<dyn LlmProvider>,
    system_prompt: String,
    model: Option<String>,
    temperature: Option<f32>,
    tools: Vec<Arc<dyn Tool<D>>>,
    max_retries: u32,
}

impl<D: Sync> ToolAgent<D> {
    pub fn new(provider: Arc<dyn LlmProvider>, system_prompt: impl Into<String>) -> Self {
        Self {
            provider,
            system_prompt: system_prompt.into(),
            model: None,
            temperature: None,
            tools: Vec::new(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool<D>>>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    fn initial_messages(&self, prompt: &str, history: Vec<AdaptedMessage>) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(&self.system_prompt));
        messages.extend(history.into_iter().map(Message::from));
        messages.push(Message::user(prompt));
        messages
    }

    fn find_tool(&self, name: &str) -> Option<&Arc<dyn Tool<D>>> {
        self.tools.iter().find(|t| t.definition().name == name)
    }

    /// Run one tool call inside a `tool.call` span.
    async fn dispatch(&self, deps: &D, call: &ToolCall) -> std::result::Result<Value, ToolError> {
        let Some(tool) = self.find_tool(&call.tool_name) else {
            let available: Vec<String> = self.tools.iter().map(|t| t.name()).collect();
            return Err(ToolError::Retry(format!(
                "Unknown tool name: '{}'. Available tools: {}",
                call.tool_name,
                available.join(", ")
            )));
        };

        let start = Instant::now();
        let result = tool
            .call(deps, call.arguments.clone())
            .instrument(tracing::info_span!(
                "tool.call",
                tool_name = %call.tool_name,
                call_id = %call.call_id,
            ))
            .await;

        TraceEvent::ToolCalled {
            tool: call.tool_name.clone(),
            is_error: result.is_err(),
            duration_ms: start.elapsed().as_millis() as u64,
        }
        .emit();
        result
    }
}

#[async_trait]
impl<D: Sync> Agent<D> for ToolAgent<D> {
    fn run_stream<'a>(
        &'a self,
        prompt: &'a str,
        deps: &'a D,
        history: Vec<AdaptedMessage>,
    ) -> BoxStream<'a, Result<String>> {
        let stream = async_stream::stream! {
            let mut messages = self.initial_messages(prompt, history);
            let tool_defs = self.tool_definitions();
            let mut retries: HashMap<String, u32> = HashMap::new();
            let mut total_usage = Usage::default();

            for loop_idx in 0..MAX_TOOL_LOOPS {
                tracing::debug!(loop_idx, "tool loop iteration");

                let req = ChatRequest {
                    messages: messages.clone(),
                    tools: tool_defs.clone(),
                    temperature: self.temperature,
                    max_tokens: None,
                    model: self.model.clone(),
                };

                let llm_call_span = tracing::info_span!(
                    "llm.call",
                    "otel.kind" = "CLIENT",
                    model = req.model.as_deref().unwrap_or("default"),
                    loop_idx,
                    input_tokens = tracing::field::Empty,
                    output_tokens = tracing::field::Empty,
                );

                let mut events = match self
                    .provider
                    .chat_stream(&req)
                    .instrument(llm_call_span.clone())
                    .await
                {
                    Ok(events) => events,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                // Accumulate the round.
                let mut text_buf = String::new();
                let mut calls = PendingCalls::default();
                let mut round_usage: Option<Usage> = None;

                while let Some(event) = events.next().await {
                    match event {
                        Ok(StreamEvent::Token { text }) => {
                            text_buf.push_str(&text);
                            yield Ok(text);
                        }
                        Ok(StreamEvent::Done { usage, .. }) => {
                            if usage.is_some() {
                                round_usage = usage;
                            }
                        }
                        Ok(StreamEvent::Error { message }) => {
                            yield Err(Error::Provider {
                                provider: self.provider.provider_id().to_owned(),
                                message,
                            });
                            return;
                        }
                        Ok(other) => calls.apply(other),
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }

                if let Some(u) = &round_usage {
                    llm_call_span.record("input_tokens", u.prompt_tokens);
                    llm_call_span.record("output_tokens", u.completion_tokens);
                    total_usage.accumulate(u);
                }

                let pending = calls.finish();
                if pending.is_empty() {
                    tracing::debug!(
                        rounds = loop_idx + 1,
                        total_tokens = total_usage.total_tokens,
                        "agent run finished"
                    );
                    return;
                }

                // ── Tool dispatch ──────────────────────────────────
                messages.push(Message::assistant_tool_calls(&text_buf, &pending));

                let results = futures_util::future::join_all(
                    pending.iter().map(|call| self.dispatch(deps, call)),
                )
                .await;

                for (call, result) in pending.iter().zip(results) {
                    match result {
                        Ok(value) => {
                            messages.push(Message::tool_result(&call.call_id, tool_content(&value)));
                        }
                        Err(ToolError::Retry(message)) => {
                            let count = retries.entry(call.tool_name.clone()).or_insert(0);
                            *count += 1;
                            if *count > self.max_retries {
                                yield Err(Error::Agent(format!(
                                    "tool '{}' exceeded max retries count of {}",
                                    call.tool_name, self.max_retries
                                )));
                                return;
                            }
                            tracing::debug!(
                                tool = %call.tool_name,
                                attempt = *count,
                                reason = %message,
                                "asking model to retry tool call"
                            );
                            messages.push(Message::tool_error(
                                &call.call_id,
                                format!("{message}\n\nFix the errors and try again."),
                            ));
                        }
                        Err(ToolError::Failed(e)) => {
                            tracing::warn!(tool = %call.tool_name, error = %e, "tool failed");
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            yield Err(Error::Agent(format!(
                "tool loop limit reached ({MAX_TOOL_LOOPS} iterations)"
            )));
        };

        Box::pin(stream)
    }
}

/// Tool output as sent back to the model: strings verbatim, anything else
/// as compact JSON.
fn tool_content(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool call assembly
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct PendingCall {
    call_id: String,
    tool_name: String,
    args: String,
    finished: Option<Value>,
}

/// Tool calls of one model round, kept in the order they started.
#[derive(Default)]
struct PendingCalls {
    calls: Vec<PendingCall>,
}

impl PendingCalls {
    fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::ToolCallStarted { call_id, tool_name } => {
                self.calls.push(PendingCall {
                    call_id,
                    tool_name,
                    args: String::new(),
                    finished: None,
                });
            }
            StreamEvent::ToolCallDelta { call_id, delta } => {
                if let Some(c) = self.calls.iter_mut().find(|c| c.call_id == call_id) {
                    c.args.push_str(&delta);
                }
            }
            StreamEvent::ToolCallFinished {
                call_id,
                tool_name,
                arguments,
            } => match self.calls.iter_mut().find(|c| c.call_id == call_id) {
                Some(c) => c.finished = Some(arguments),
                None => self.calls.push(PendingCall {
                    call_id,
                    tool_name,
                    args: String::new(),
                    finished: Some(arguments),
                }),
            },
            _ => {}
        }
    }

    fn finish(self) -> Vec<ToolCall> {
        self.calls
            .into_iter()
            .map(|c| {
                let arguments = match c.finished {
                    Some(v) => v,
                    None => parse_arguments(&c.call_id, &c.tool_name, &c.args),
                };
                ToolCall {
                    call_id: c.call_id,
                    tool_name: c.tool_name,
                    arguments,
                }
            })
            .collect()
    }
}

fn parse_arguments(call_id: &str, tool_name: &str, args: &str) -> Value {
    if args.trim().is_empty() {
        return Value::Object(Default::default());
    }
    match serde_json::from_str(args) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(
                call_id = %call_id,
                tool = %tool_name,
                error = %e,
                "tool call arguments are not valid JSON; defaulting to empty object"
            );
            Value::Object(Default::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calls_keep_start_order_and_concatenate_deltas() {
        let mut calls = PendingCalls::default();
        calls.apply(StreamEvent::ToolCallStarted {
            call_id: "a".into(),
            tool_name: "get_lat_lng".into(),
        });
        calls.apply(StreamEvent::ToolCallStarted {
            call_id: "b".into(),
            tool_name: "get_lat_lng".into(),
        });
        calls.apply(StreamEvent::ToolCallDelta {
            call_id: "b".into(),
            delta: "{\"location_description\":".into(),
        });
        calls.apply(StreamEvent::ToolCallDelta {
            call_id: "a".into(),
            delta: "{\"location_description\":\"London\"}".into(),
        });
        calls.apply(StreamEvent::ToolCallDelta {
            call_id: "b".into(),
            delta: "\"Wiltshire\"}".into(),
        });

        let done = calls.finish();
        assert_eq!(done.len(), 2);
        assert_eq!(done[0].call_id, "a");
        assert_eq!(done[0].arguments["location_description"], "London");
        assert_eq!(done[1].arguments["location_description"], "Wiltshire");
    }

    #[test]
    fn empty_or_broken_arguments_become_empty_object() {
        assert_eq!(parse_arguments("x", "t", "  "), serde_json::json!({}));
        assert_eq!(parse_arguments("x", "t", "{oops"), serde_json::json!({}));
    }

    #[test]
    fn finished_event_overrides_streamed_arguments() {
        let mut calls = PendingCalls::default();
        calls.apply(StreamEvent::ToolCallStarted {
            call_id: "a".into(),
            tool_name: "get_weather".into(),
        });
        calls.apply(StreamEvent::ToolCallFinished {
            call_id: "a".into(),
            tool_name: "get_weather".into(),
            arguments: serde_json::json!({"lat": 1.0, "lng": 2.0}),
        });
        let done = calls.finish();
        assert_eq!(done[0].arguments, serde_json::json!({"lat": 1.0, "lng": 2.0}));
    }

    #[test]
    fn tool_content_passes_strings_through() {
        assert_eq!(tool_content(&Value::String("plain".into())), "plain");
        assert_eq!(tool_content(&serde_json::json!({"lat": 1.5})), r#"{"lat":1.5}"#);
    }
}
