//! Append-only message history for a single chat session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Who authored a turn.
///
/// `Unknown` covers any role string read back from foreign data; such turns
/// are kept in the log but never reach the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    #[serde(other)]
    Unknown,
}

impl TurnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::Unknown => "unknown",
        }
    }
}

/// One message in the conversation. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self::now(TurnRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::now(TurnRole::Assistant, content)
    }

    fn now(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Some(Utc::now()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session history
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ordered log of turns owned by exactly one session.
///
/// Created when the session starts and dropped when it ends. Insertion
/// order is the conversation order handed to the agent, so the log is never
/// reordered, deduplicated or edited in place.
#[derive(Debug, Clone)]
pub struct SessionHistory {
    session_id: String,
    created_at: DateTime<Utc>,
    turns: Vec<Turn>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            turns: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Every turn before the most recent one.
    ///
    /// Right after the pending user turn is appended this is exactly the
    /// context the agent should see, without the question itself.
    pub fn prior_to_pending(&self) -> &[Turn] {
        match self.turns.split_last() {
            Some((_, prior)) => prior,
            None => &[],
        }
    }
}

impl Default for SessionHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_order() {
        let mut h = SessionHistory::new();
        h.append(Turn::user("one"));
        h.append(Turn::assistant("two"));
        h.append(Turn::user("three"));

        let contents: Vec<&str> = h.turns().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn prior_to_pending_excludes_last_turn() {
        let mut h = SessionHistory::new();
        assert!(h.prior_to_pending().is_empty());

        h.append(Turn::user("Hello"));
        assert!(h.prior_to_pending().is_empty());

        h.append(Turn::assistant("Hi"));
        h.append(Turn::user("How are you?"));
        let prior = h.prior_to_pending();
        assert_eq!(prior.len(), 2);
        assert_eq!(prior[1].content, "Hi");
    }

    #[test]
    fn sessions_get_distinct_ids() {
        assert_ne!(SessionHistory::new().session_id(), SessionHistory::new().session_id());
    }

    #[test]
    fn unrecognized_role_deserializes_as_unknown() {
        let turn: Turn = serde_json::from_str(r#"{"role":"system","content":"x"}"#).unwrap();
        assert_eq!(turn.role, TurnRole::Unknown);
        assert!(turn.timestamp.is_none());
    }
}
