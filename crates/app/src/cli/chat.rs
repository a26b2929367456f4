//! `kbagent chat`: interactive REPL over the knowledge-base expert.
//!
//! Each line becomes one turn: the reply streams to stdout as it arrives,
//! banners, hints and errors go to stderr.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use ka_agent::{kb_agent, kb_deps, run_turn, ToolAgent, TurnOptions, TurnRenderer};
use ka_domain::config::Config;
use ka_providers::{LlmProvider, OpenAiCompatProvider};
use ka_sessions::{SessionHistory, TranscriptWriter};
use ka_tools::KbDeps;
use ka_vectorstore::{SupabaseClient, VectorStore};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run the interactive chat REPL until `/exit`, `/quit` or Ctrl+D.
pub async fn chat(config: Arc<Config>) -> anyhow::Result<()> {
    // 1. Clients and the agent, built once per process.
    let provider: Arc<dyn LlmProvider> = Arc::new(
        OpenAiCompatProvider::from_config(&config.llm).context("building the LLM client")?,
    );
    let store: Arc<dyn VectorStore> = Arc::new(
        SupabaseClient::new(&config.supabase).context("building the vector store client")?,
    );
    let agent = kb_agent(provider.clone(), &config);
    let deps = kb_deps(&config, store, provider);

    let options = TurnOptions {
        idle_timeout: config.chat.stream_idle_timeout_ms.map(Duration::from_millis),
    };
    let transcript = match &config.chat.transcript_dir {
        Some(dir) => Some(TranscriptWriter::new(dir).context("opening the transcript directory")?),
        None => None,
    };

    // 2. Readline editor with persistent history.
    let history_path = config
        .chat
        .history_file
        .clone()
        .unwrap_or_else(default_history_path);
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    // 3. Banner on stderr (stdout carries replies only).
    eprintln!("{}", config.chat.title);
    eprintln!("{}  |  Type /help for commands, Ctrl+D to exit", config.chat.input_hint);
    eprintln!();

    let mut session = ChatSession {
        agent,
        deps,
        options,
        transcript,
        history: SessionHistory::new(),
    };

    // 4. REPL loop.
    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                rl.add_history_entry(&line).ok();

                if trimmed.starts_with('/') {
                    if handle_slash_command(trimmed, &mut session.history) {
                        break;
                    }
                    continue;
                }

                session.send(trimmed).await;
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    rl.save_history(&history_path).ok();
    eprintln!("Goodbye!");
    Ok(())
}

fn default_history_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".kbagent")
        .join("chat_history.txt")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ChatSession {
    agent: ToolAgent<KbDeps>,
    deps: KbDeps,
    options: TurnOptions,
    transcript: Option<TranscriptWriter>,
    history: SessionHistory,
}

impl ChatSession {
    /// One round-trip. Failures are already rendered and committed by the
    /// turn handler; only transcript I/O is reported here.
    async fn send(&mut self, utterance: &str) {
        let mut renderer = TerminalRenderer::default();
        run_turn(
            &self.agent,
            &self.deps,
            &mut self.history,
            utterance,
            &mut renderer,
            &self.options,
        )
        .await;

        if let Some(writer) = &self.transcript {
            let turns = self.history.turns();
            let latest = &turns[turns.len().saturating_sub(2)..];
            if let Err(e) = writer.append_async(self.history.session_id(), latest).await {
                tracing::warn!(error = %e, "transcript append failed");
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slash command handling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process a slash command. Returns `true` if the REPL should exit.
fn handle_slash_command(input: &str, history: &mut SessionHistory) -> bool {
    let cmd = input.split_whitespace().next().unwrap_or(input);

    match cmd {
        "/exit" | "/quit" => return true,

        "/clear" => {
            // ANSI escape: clear screen and move cursor to top-left.
            eprint!("\x1B[2J\x1B[1;1H");
        }

        "/reset" => {
            *history = SessionHistory::new();
            eprintln!("Session reset. New session: {}", history.session_id());
        }

        "/help" => {
            eprintln!("Commands:");
            eprintln!("  /clear           Clear the screen");
            eprintln!("  /reset           Start a fresh session (empty history)");
            eprintln!("  /exit, /quit     Exit the chat");
            eprintln!("  /help            Show this help");
        }

        other => {
            eprintln!("Unknown command: {other}  (type /help for a list)");
        }
    }

    false
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rendering
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Writes the assistant message to stdout as it grows.
///
/// The turn handler passes the full accumulated text each time; a terminal
/// can only append, so only the suffix not yet printed is written.
#[derive(Default)]
struct TerminalRenderer {
    printed: usize,
}

impl TurnRenderer for TerminalRenderer {
    fn render_start(&mut self) {
        eprintln!("\x1B[2mSearching knowledge base...\x1B[0m");
    }

    fn render_partial(&mut self, accumulated: &str) {
        if let Some(fresh) = accumulated.get(self.printed..) {
            print!("{fresh}");
            std::io::stdout().flush().ok();
        }
        self.printed = accumulated.len();
    }

    fn render_final(&mut self, _text: &str) {
        println!();
        println!();
    }

    fn render_error(&mut self, error_text: &str) {
        if self.printed > 0 {
            println!();
        }
        eprintln!("\x1B[31m{error_text}\x1B[0m");
        eprintln!();
    }
}
