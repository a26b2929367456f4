//! Streaming turn handler: one user utterance in, one committed assistant
//! turn out.

use std::time::Duration;

use futures_util::StreamExt;
use tracing::Instrument;

use ka_domain::error::{Error, Result};
use ka_domain::trace::TraceEvent;
use ka_sessions::{adapt_history, AdaptedMessage, SessionHistory, Turn};

use crate::agent::Agent;

/// Receives progressive output for the assistant message being produced.
///
/// Every call replaces what was shown before: `render_partial` always gets
/// the whole text accumulated so far, not just the latest delta.
pub trait TurnRenderer {
    /// Called once before the agent is contacted.
    fn render_start(&mut self) {}

    fn render_partial(&mut self, accumulated: &str);

    fn render_final(&mut self, text: &str);

    /// `error_text` is the exact text committed to the history.
    fn render_error(&mut self, error_text: &str);
}

#[derive(Debug, Clone, Default)]
pub struct TurnOptions {
    /// Longest wait for the next delta. `None` waits indefinitely.
    ///
    /// The clock also runs while the agent executes tool calls, since no
    /// deltas arrive then. It bounds every silent gap in the turn, so a
    /// slow tool can time the turn out.
    pub idle_timeout: Option<Duration>,
}

/// Result of one round-trip. Either way, an assistant turn was committed.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed { text: String },
    /// `error` is the committed `"Error: ..."` text.
    Failed { error: String },
}

impl TurnOutcome {
    /// The content committed as the assistant turn.
    pub fn committed_text(&self) -> &str {
        match self {
            TurnOutcome::Completed { text } => text,
            TurnOutcome::Failed { error } => error,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TurnOutcome::Failed { .. })
    }
}

/// Run one conversational round-trip.
///
/// Appends the user turn, streams the agent's reply against the history
/// that precedes it, and appends exactly one assistant turn: the full reply,
/// or `"Error: <description>"` when anything fails along the way.
pub async fn run_turn<A, D, R>(
    agent: &A,
    deps: &D,
    history: &mut SessionHistory,
    utterance: &str,
    renderer: &mut R,
    options: &TurnOptions,
) -> TurnOutcome
where
    A: Agent<D> + ?Sized,
    D: Sync,
    R: TurnRenderer + ?Sized,
{
    let span = tracing::info_span!(
        "turn",
        session_id = %history.session_id(),
        history_len = history.len(),
    );

    async move {
        history.append(Turn::user(utterance));
        let adapted = adapt_history(history.prior_to_pending());

        renderer.render_start();
        let outcome = match stream_reply(agent, deps, utterance, adapted, renderer, options).await {
            Ok(text) => {
                renderer.render_final(&text);
                TurnOutcome::Completed { text }
            }
            Err(e) => {
                tracing::warn!(error = %e, "turn failed");
                let error = format!("Error: {e}");
                renderer.render_error(&error);
                TurnOutcome::Failed { error }
            }
        };

        history.append(Turn::assistant(outcome.committed_text()));

        TraceEvent::TurnCommitted {
            session_id: history.session_id().to_owned(),
            history_len: history.len(),
            failed: outcome.is_failed(),
        }
        .emit();

        outcome
    }
    .instrument(span)
    .await
}

/// Pull deltas until the stream ends, rendering the running text.
async fn stream_reply<A, D, R>(
    agent: &A,
    deps: &D,
    utterance: &str,
    adapted: Vec<AdaptedMessage>,
    renderer: &mut R,
    options: &TurnOptions,
) -> Result<String>
where
    A: Agent<D> + ?Sized,
    D: Sync,
    R: TurnRenderer + ?Sized,
{
    let mut stream = agent.run_stream(utterance, deps, adapted);
    let mut accumulated = String::new();

    loop {
        let next = match options.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, stream.next())
                .await
                .map_err(|_| {
                    Error::Timeout(format!(
                        "no response from the agent within {} ms",
                        limit.as_millis()
                    ))
                })?,
            None => stream.next().await,
        };

        let Some(delta) = next else {
            break;
        };
        accumulated.push_str(&delta?);
        renderer.render_partial(&accumulated);
    }

    Ok(accumulated)
}
