//! History adapter: stored turns → messages the agent accepts as context.

use ka_domain::tool::Message;
use serde::Serialize;

use crate::history::{Turn, TurnRole};

/// A user-authored prompt from an earlier turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserPart {
    pub content: String,
}

/// Model-authored text from an earlier turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponsePart {
    pub content: String,
}

/// A prior turn in the shape the agent takes as history.
///
/// Built fresh for every call and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdaptedMessage {
    Request(UserPart),
    Response(ResponsePart),
}

impl AdaptedMessage {
    pub fn content(&self) -> &str {
        match self {
            AdaptedMessage::Request(p) => &p.content,
            AdaptedMessage::Response(p) => &p.content,
        }
    }
}

impl From<AdaptedMessage> for Message {
    fn from(m: AdaptedMessage) -> Self {
        match m {
            AdaptedMessage::Request(p) => Message::user(p.content),
            AdaptedMessage::Response(p) => Message::assistant(p.content),
        }
    }
}

/// Map prior turns to adapted messages, preserving order.
///
/// Total over any input: turns with an unrecognized role are skipped rather
/// than treated as an error.
pub fn adapt_history(turns: &[Turn]) -> Vec<AdaptedMessage> {
    turns
        .iter()
        .enumerate()
        .filter_map(|(idx, turn)| match turn.role {
            TurnRole::User => Some(AdaptedMessage::Request(UserPart {
                content: turn.content.clone(),
            })),
            TurnRole::Assistant => Some(AdaptedMessage::Response(ResponsePart {
                content: turn.content.clone(),
            })),
            TurnRole::Unknown => {
                tracing::debug!(index = idx, "dropping turn with unrecognized role");
                None
            }
        })
        .collect()
}
