//! `ToolAgent` against a scripted provider: tool dispatch, retries, limits.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;

use ka_agent::{weather_agent, Agent, ToolAgent, MAX_TOOL_LOOPS};
use ka_domain::config::Config;
use ka_domain::error::{Error, Result};
use ka_domain::stream::{BoxStream, StreamEvent};
use ka_domain::tool::{ContentPart, Message, MessageContent, Role, ToolDefinition};
use ka_providers::{ChatRequest, EmbeddingsRequest, EmbeddingsResponse, LlmProvider};
use ka_sessions::{AdaptedMessage, ResponsePart, UserPart};
use ka_tools::{Tool, ToolError, WeatherDeps};

// ── Scripted provider ────────────────────────────────────────────────

#[derive(Default)]
struct ScriptedProvider {
    rounds: Mutex<VecDeque<Vec<StreamEvent>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    fn new(rounds: Vec<Vec<StreamEvent>>) -> Arc<Self> {
        Arc::new(Self {
            rounds: Mutex::new(rounds.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request(&self, idx: usize) -> ChatRequest {
        self.requests.lock().unwrap()[idx].clone()
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        self.requests.lock().unwrap().push(req.clone());
        let round = self
            .rounds
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Http("connection refused".into()))?;
        Ok(Box::pin(futures_util::stream::iter(round.into_iter().map(Ok))))
    }

    async fn embeddings(&self, _req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        Err(Error::Other("not scripted".into()))
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

fn text(t: &str) -> StreamEvent {
    StreamEvent::Token { text: t.into() }
}

fn done() -> StreamEvent {
    StreamEvent::Done {
        usage: None,
        finish_reason: Some("stop".into()),
    }
}

fn tool_call(id: &str, name: &str, args: &str) -> Vec<StreamEvent> {
    vec![
        StreamEvent::ToolCallStarted {
            call_id: id.into(),
            tool_name: name.into(),
        },
        StreamEvent::ToolCallDelta {
            call_id: id.into(),
            delta: args.into(),
        },
        StreamEvent::Done {
            usage: None,
            finish_reason: Some("tool_calls".into()),
        },
    ]
}

/// Text of every tool-result message in a request, in order.
fn tool_results(req: &ChatRequest) -> Vec<(String, bool)> {
    req.messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| match &m.content {
            MessageContent::Parts(parts) => parts.iter().find_map(|p| match p {
                ContentPart::ToolResult {
                    content, is_error, ..
                } => Some((content.clone(), *is_error)),
                _ => None,
            }),
            _ => None,
        })
        .collect()
}

// ── Test tools ───────────────────────────────────────────────────────

fn def(name: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.into(),
        description: format!("{name} tool"),
        parameters: serde_json::json!({"type": "object"}),
    }
}

struct Echo;

#[async_trait]
impl Tool<()> for Echo {
    fn definition(&self) -> ToolDefinition {
        def("echo")
    }
    async fn call(&self, _deps: &(), args: Value) -> std::result::Result<Value, ToolError> {
        Ok(args)
    }
}

struct AlwaysRetry;

#[async_trait]
impl Tool<()> for AlwaysRetry {
    fn definition(&self) -> ToolDefinition {
        def("flaky")
    }
    async fn call(&self, _deps: &(), _args: Value) -> std::result::Result<Value, ToolError> {
        Err(ToolError::Retry("Could not find the location".into()))
    }
}

struct Broken;

#[async_trait]
impl Tool<()> for Broken {
    fn definition(&self) -> ToolDefinition {
        def("broken")
    }
    async fn call(&self, _deps: &(), _args: Value) -> std::result::Result<Value, ToolError> {
        Err(ToolError::Failed(Error::Http("upstream returned 503".into())))
    }
}

fn agent(provider: Arc<ScriptedProvider>, tools: Vec<Arc<dyn Tool<()>>>) -> ToolAgent<()> {
    ToolAgent::new(provider, "You are a test agent.").with_tools(tools)
}

// ── Tests ────────────────────────────────────────────────────────────

#[tokio::test]
async fn plain_answer_streams_tokens() {
    let provider = ScriptedProvider::new(vec![vec![text("Hello"), text(" there"), done()]]);
    let agent = agent(provider.clone(), vec![]);

    let deltas: Vec<String> = agent
        .run_stream("Hi", &(), Vec::new())
        .map(|d| d.unwrap())
        .collect()
        .await;

    assert_eq!(deltas, vec!["Hello", " there"]);
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test]
async fn request_carries_system_history_and_prompt() {
    let provider = ScriptedProvider::new(vec![vec![text("ok"), done()]]);
    let agent = agent(provider.clone(), vec![Arc::new(Echo)]);
    let history = vec![
        AdaptedMessage::Request(UserPart {
            content: "earlier question".into(),
        }),
        AdaptedMessage::Response(ResponsePart {
            content: "earlier answer".into(),
        }),
    ];

    agent.run("new question", &(), history).await.unwrap();

    let req = provider.request(0);
    assert_eq!(
        req.messages,
        vec![
            Message::system("You are a test agent."),
            Message::user("earlier question"),
            Message::assistant("earlier answer"),
            Message::user("new question"),
        ]
    );
    assert_eq!(req.tools.len(), 1);
    assert_eq!(req.tools[0].name, "echo");
}

#[tokio::test]
async fn stream_is_lazy_until_polled() {
    let provider = ScriptedProvider::new(vec![]);
    let agent = agent(provider.clone(), vec![]);

    let mut stream = agent.run_stream("Hi", &(), Vec::new());
    assert_eq!(provider.request_count(), 0);

    let first = stream.next().await.unwrap();
    assert!(matches!(first, Err(Error::Http(_))));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn tool_result_is_fed_back_to_the_model() {
    let provider = ScriptedProvider::new(vec![
        tool_call("call_1", "echo", r#"{"word":"hi"}"#),
        vec![text("Echoed."), done()],
    ]);
    let agent = agent(provider.clone(), vec![Arc::new(Echo)]);

    let out = agent.run("echo hi", &(), Vec::new()).await.unwrap();
    assert_eq!(out, "Echoed.");

    let second = provider.request(1);
    assert_eq!(tool_results(&second), vec![(r#"{"word":"hi"}"#.to_owned(), false)]);
    assert!(second
        .messages
        .iter()
        .any(|m| m.role == Role::Assistant && matches!(&m.content, MessageContent::Parts(_))));
}

#[tokio::test]
async fn unknown_tool_gets_retry_prompt() {
    let provider = ScriptedProvider::new(vec![
        tool_call("call_1", "nope", "{}"),
        vec![text("Sorry."), done()],
    ]);
    let agent = agent(provider.clone(), vec![Arc::new(Echo)]);

    agent.run("x", &(), Vec::new()).await.unwrap();

    let results = tool_results(&provider.request(1));
    assert_eq!(results.len(), 1);
    assert!(results[0].1);
    assert!(results[0].0.contains("Unknown tool name: 'nope'"));
    assert!(results[0].0.contains("echo"));
    assert!(results[0].0.ends_with("Fix the errors and try again."));
}

#[tokio::test]
async fn retries_are_capped_per_tool() {
    let provider = ScriptedProvider::new(vec![
        tool_call("c1", "flaky", "{}"),
        tool_call("c2", "flaky", "{}"),
        tool_call("c3", "flaky", "{}"),
        vec![text("never reached"), done()],
    ]);
    let agent = agent(provider.clone(), vec![Arc::new(AlwaysRetry)]).with_max_retries(2);

    let err = agent.run("where?", &(), Vec::new()).await.unwrap_err();

    assert!(matches!(&err, Error::Agent(msg) if msg.contains("exceeded max retries")));
    assert_eq!(provider.request_count(), 3);
}

#[tokio::test]
async fn failed_tool_fails_the_run() {
    let provider = ScriptedProvider::new(vec![tool_call("c1", "broken", "{}")]);
    let agent = agent(provider, vec![Arc::new(Broken)]);

    let err = agent.run("x", &(), Vec::new()).await.unwrap_err();
    assert!(matches!(err, Error::Http(msg) if msg.contains("503")));
}

#[tokio::test]
async fn provider_error_event_fails_the_run() {
    let provider = ScriptedProvider::new(vec![vec![
        text("Part"),
        StreamEvent::Error {
            message: "rate limited".into(),
        },
    ]]);
    let agent = agent(provider, vec![]);

    let items: Vec<Result<String>> = agent.run_stream("x", &(), Vec::new()).collect().await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_deref().unwrap(), "Part");
    assert!(matches!(&items[1], Err(Error::Provider { message, .. }) if message == "rate limited"));
}

#[tokio::test]
async fn endless_tool_calls_hit_the_loop_limit() {
    let rounds = (0..MAX_TOOL_LOOPS)
        .map(|i| tool_call(&format!("c{i}"), "echo", "{}"))
        .collect();
    let provider = ScriptedProvider::new(rounds);
    let agent = agent(provider.clone(), vec![Arc::new(Echo)]);

    let err = agent.run("loop", &(), Vec::new()).await.unwrap_err();
    assert!(matches!(&err, Error::Agent(msg) if msg.contains("tool loop limit")));
    assert_eq!(provider.request_count(), MAX_TOOL_LOOPS);
}

#[tokio::test]
async fn weather_agent_runs_on_dummy_data_without_keys() {
    let provider = ScriptedProvider::new(vec![
        tool_call("g1", "get_lat_lng", r#"{"location_description":"London"}"#),
        tool_call("w1", "get_weather", r#"{"lat":51.1,"lng":-0.1}"#),
        vec![text("It is sunny in London at 21 °C."), done()],
    ]);
    let agent = weather_agent(provider.clone(), &Config::default());
    let deps = WeatherDeps::from_config(&Config::default().weather).unwrap();

    let out = agent
        .run("What is the weather like in London?", &deps, Vec::new())
        .await
        .unwrap();
    assert_eq!(out, "It is sunny in London at 21 °C.");

    let geocoded = tool_results(&provider.request(1));
    let coords: Value = serde_json::from_str(&geocoded[0].0).unwrap();
    assert_eq!(coords, serde_json::json!({"lat": 51.1, "lng": -0.1}));

    let weather = tool_results(&provider.request(2));
    let forecast: Value = serde_json::from_str(&weather[1].0).unwrap();
    assert_eq!(forecast["description"], "Sunny");
    assert_eq!(provider.request(0).model.as_deref(), Some("gpt-4o-mini"));
}
