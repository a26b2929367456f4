//! Round-trip behaviour of the streaming turn handler against a scripted agent.

use std::sync::Mutex;
use std::time::Duration;

use futures_util::StreamExt;

use ka_agent::{run_turn, Agent, TurnOptions, TurnOutcome, TurnRenderer};
use ka_domain::error::{Error, Result};
use ka_domain::stream::BoxStream;
use ka_sessions::{AdaptedMessage, ResponsePart, SessionHistory, Turn, TurnRole, UserPart};

// ── Test doubles ─────────────────────────────────────────────────────

#[derive(Clone)]
enum Step {
    Delta(&'static str),
    Fail(&'static str),
}

struct ScriptedAgent {
    script: Vec<Step>,
    seen_history: Mutex<Vec<Vec<AdaptedMessage>>>,
    seen_prompts: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    fn new(script: Vec<Step>) -> Self {
        Self {
            script,
            seen_history: Mutex::new(Vec::new()),
            seen_prompts: Mutex::new(Vec::new()),
        }
    }

    fn replying(text: &'static str) -> Self {
        Self::new(vec![Step::Delta(text)])
    }
}

impl Agent<()> for ScriptedAgent {
    fn run_stream<'a>(
        &'a self,
        prompt: &'a str,
        _deps: &'a (),
        history: Vec<AdaptedMessage>,
    ) -> BoxStream<'a, Result<String>> {
        self.seen_history.lock().unwrap().push(history);
        self.seen_prompts.lock().unwrap().push(prompt.to_owned());
        let items: Vec<Result<String>> = self
            .script
            .iter()
            .map(|step| match step {
                Step::Delta(t) => Ok((*t).to_owned()),
                Step::Fail(m) => Err(Error::Other((*m).to_owned())),
            })
            .collect();
        Box::pin(futures_util::stream::iter(items))
    }
}

/// An agent that speaks, goes quiet for `pause` (as during a tool call),
/// then finishes.
struct PausingAgent {
    pause: Duration,
}

impl Agent<()> for PausingAgent {
    fn run_stream<'a>(
        &'a self,
        _prompt: &'a str,
        _deps: &'a (),
        _history: Vec<AdaptedMessage>,
    ) -> BoxStream<'a, Result<String>> {
        let pause = self.pause;
        let first = futures_util::stream::iter([Ok("Checking the forecast. ".to_owned())]);
        let rest = futures_util::stream::once(async move {
            tokio::time::sleep(pause).await;
            Ok("Sunny.".to_owned())
        });
        Box::pin(first.chain(rest))
    }
}

/// An agent whose stream never produces anything.
struct SilentAgent;

impl Agent<()> for SilentAgent {
    fn run_stream<'a>(
        &'a self,
        _prompt: &'a str,
        _deps: &'a (),
        _history: Vec<AdaptedMessage>,
    ) -> BoxStream<'a, Result<String>> {
        Box::pin(futures_util::stream::pending())
    }
}

#[derive(Default)]
struct Recorder {
    started: usize,
    partials: Vec<String>,
    finals: Vec<String>,
    errors: Vec<String>,
}

impl TurnRenderer for Recorder {
    fn render_start(&mut self) {
        self.started += 1;
    }
    fn render_partial(&mut self, accumulated: &str) {
        self.partials.push(accumulated.to_owned());
    }
    fn render_final(&mut self, text: &str) {
        self.finals.push(text.to_owned());
    }
    fn render_error(&mut self, error_text: &str) {
        self.errors.push(error_text.to_owned());
    }
}

async fn turn(agent: &dyn Agent<()>, history: &mut SessionHistory, text: &str) -> (TurnOutcome, Recorder) {
    let mut recorder = Recorder::default();
    let outcome = run_turn(agent, &(), history, text, &mut recorder, &TurnOptions::default()).await;
    (outcome, recorder)
}

// ── Tests ────────────────────────────────────────────────────────────

#[tokio::test]
async fn hello_on_empty_history() {
    let agent = ScriptedAgent::new(vec![Step::Delta("Hi"), Step::Delta(", how can I help?")]);
    let mut history = SessionHistory::new();

    let (outcome, recorder) = turn(&agent, &mut history, "Hello").await;

    assert_eq!(agent.seen_history.lock().unwrap()[0], Vec::<AdaptedMessage>::new());
    assert_eq!(agent.seen_prompts.lock().unwrap()[0], "Hello");

    assert_eq!(history.len(), 2);
    assert_eq!(history.turns()[0].role, TurnRole::User);
    assert_eq!(history.turns()[0].content, "Hello");
    assert_eq!(history.turns()[1].role, TurnRole::Assistant);
    assert_eq!(history.turns()[1].content, "Hi, how can I help?");

    assert_eq!(
        outcome,
        TurnOutcome::Completed {
            text: "Hi, how can I help?".into()
        }
    );
    assert_eq!(recorder.started, 1);
    assert_eq!(recorder.partials, vec!["Hi", "Hi, how can I help?"]);
    assert_eq!(recorder.finals, vec!["Hi, how can I help?"]);
    assert!(recorder.errors.is_empty());
}

#[tokio::test]
async fn committed_text_equals_concatenated_deltas() {
    let deltas = ["The ", "library ", "opens ", "at ", "8", "."];
    let agent = ScriptedAgent::new(deltas.iter().map(|d| Step::Delta(*d)).collect());
    let mut history = SessionHistory::new();

    turn(&agent, &mut history, "When does the library open?").await;

    assert_eq!(history.turns()[1].content, deltas.concat());
}

#[tokio::test]
async fn every_round_adds_exactly_two_turns() {
    let ok = ScriptedAgent::replying("fine");
    let broken = ScriptedAgent::new(vec![Step::Fail("service unavailable")]);
    let mut history = SessionHistory::new();

    for round in 0..6 {
        let before = history.len();
        let agent: &dyn Agent<()> = if round % 2 == 0 { &ok } else { &broken };
        turn(agent, &mut history, "question").await;
        assert_eq!(history.len(), before + 2);
        assert_eq!(history.turns()[before].role, TurnRole::User);
        assert_eq!(history.turns()[before + 1].role, TurnRole::Assistant);
    }
}

#[tokio::test]
async fn pending_utterance_is_not_in_agent_history() {
    let agent = ScriptedAgent::replying("answer");
    let mut history = SessionHistory::new();

    turn(&agent, &mut history, "first").await;
    turn(&agent, &mut history, "second").await;

    let seen = agent.seen_history.lock().unwrap();
    assert_eq!(
        seen[1],
        vec![
            AdaptedMessage::Request(UserPart {
                content: "first".into()
            }),
            AdaptedMessage::Response(ResponsePart {
                content: "answer".into()
            }),
        ]
    );
    assert!(seen[1].iter().all(|m| m.content() != "second"));
}

#[tokio::test]
async fn mid_stream_failure_commits_error_text() {
    let agent = ScriptedAgent::new(vec![Step::Delta("Partial"), Step::Fail("connection reset")]);
    let mut history = SessionHistory::new();

    let (outcome, recorder) = turn(&agent, &mut history, "Tell me about housing").await;

    assert_eq!(
        outcome,
        TurnOutcome::Failed {
            error: "Error: connection reset".into()
        }
    );
    assert_eq!(history.len(), 2);
    assert_eq!(history.turns()[1].content, "Error: connection reset");
    assert_ne!(history.turns()[1].content, "Partial");
    assert_eq!(recorder.partials, vec!["Partial"]);
    assert_eq!(recorder.errors, vec!["Error: connection reset"]);
    assert!(recorder.finals.is_empty());
}

#[tokio::test]
async fn failure_before_first_delta_is_committed() {
    let agent = ScriptedAgent::new(vec![Step::Fail("auth: no API key configured")]);
    let mut history = SessionHistory::new();

    let (outcome, recorder) = turn(&agent, &mut history, "Hi").await;

    assert!(outcome.is_failed());
    assert_eq!(history.turns()[1].content, "Error: auth: no API key configured");
    assert!(recorder.partials.is_empty());
}

#[tokio::test]
async fn unknown_roles_never_reach_the_agent() {
    let agent = ScriptedAgent::replying("ok");
    let mut history = SessionHistory::new();
    history.append(Turn::user("earlier"));
    history.append(Turn {
        role: TurnRole::Unknown,
        content: "imported note".into(),
        timestamp: None,
    });
    history.append(Turn::assistant("earlier answer"));

    turn(&agent, &mut history, "now").await;

    let seen = agent.seen_history.lock().unwrap();
    assert_eq!(seen[0].len(), 2);
    assert!(seen[0].iter().all(|m| m.content() != "imported note"));
    assert_eq!(history.len(), 5);
}

#[tokio::test]
async fn idle_timeout_fails_the_turn() {
    let mut history = SessionHistory::new();
    let mut recorder = Recorder::default();
    let options = TurnOptions {
        idle_timeout: Some(Duration::from_millis(20)),
    };

    let outcome = run_turn(&SilentAgent, &(), &mut history, "Hello?", &mut recorder, &options).await;

    match outcome {
        TurnOutcome::Failed { error } => assert!(error.starts_with("Error: timeout:"), "{error}"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn idle_timeout_covers_silent_tool_work() {
    let mut history = SessionHistory::new();
    let mut recorder = Recorder::default();
    let options = TurnOptions {
        idle_timeout: Some(Duration::from_millis(20)),
    };
    let agent = PausingAgent {
        pause: Duration::from_millis(500),
    };

    let outcome = run_turn(&agent, &(), &mut history, "Weather?", &mut recorder, &options).await;

    match outcome {
        TurnOutcome::Failed { error } => assert!(error.starts_with("Error: timeout:"), "{error}"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(recorder.partials, vec!["Checking the forecast. ".to_owned()]);
}

#[tokio::test]
async fn pause_within_idle_timeout_completes() {
    let mut history = SessionHistory::new();
    let mut recorder = Recorder::default();
    let options = TurnOptions {
        idle_timeout: Some(Duration::from_secs(5)),
    };
    let agent = PausingAgent {
        pause: Duration::from_millis(10),
    };

    let outcome = run_turn(&agent, &(), &mut history, "Weather?", &mut recorder, &options).await;

    assert_eq!(
        outcome,
        TurnOutcome::Completed {
            text: "Checking the forecast. Sunny.".into()
        }
    );
}
