//! Conversation state for one interactive session.
//!
//! An append-only history of turns, the adapter that turns that history into
//! agent-ready messages, and an optional JSONL transcript export.

pub mod adapter;
pub mod history;
pub mod transcript;

pub use adapter::{adapt_history, AdaptedMessage, ResponsePart, UserPart};
pub use history::{SessionHistory, Turn, TurnRole};
pub use transcript::{TranscriptLine, TranscriptWriter};
