//! Bounded conversation history.
//!
//! The history is an ordered log of user/assistant turns that supplies
//! conversational context to subsequent requests. It is bounded: once the
//! number of stored turns exceeds the configured maximum, the oldest turns
//! are dropped first, preserving the most recent exchanges.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Default maximum number of stored turns (10 exchanges).
pub const DEFAULT_MAX_HISTORY: usize = 20;

/// Role of a conversation turn.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User role.
    User,

    /// Assistant role.
    Assistant,
}

impl Role {
    /// Wire name of the role, as used by OpenAI-style request payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message record, either from the user or the assistant.
///
/// Turns are immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// The role of the speaker.
    pub role: Role,

    /// The message text.
    pub content: String,
}

impl Turn {
    /// Creates a new turn.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a new user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates a new assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// An OpenAI-shaped message record: `{"role": "...", "content": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message.
    pub role: String,

    /// The content of the message.
    pub content: String,
}

/// A bounded, ordered log of conversation turns.
///
/// Insertion order is conversation order. After [`trim`](ChatHistory::trim)
/// the stored length never exceeds the configured maximum.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    turns: VecDeque<Turn>,
    max_len: usize,
}

impl ChatHistory {
    /// Creates an empty history with the default bound.
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_HISTORY)
    }

    /// Creates an empty history with a custom bound.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_len,
        }
    }

    /// Appends one turn at the tail.
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push_back(Turn::new(role, content));
    }

    /// Drops turns from the head until the length fits the configured bound.
    pub fn trim(&mut self) {
        while self.turns.len() > self.max_len {
            self.turns.pop_front();
        }
    }

    /// Empties the history. Irreversible.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Returns the number of stored turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns true if no turns are stored.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Returns the configured maximum number of turns.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Iterates over the stored turns in conversation order.
    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// Converts the history to the Gemini request shape: a flat ordered list
    /// of content strings. Does not mutate the history.
    pub fn to_gemini_format(&self) -> Vec<String> {
        self.turns.iter().map(|turn| turn.content.clone()).collect()
    }

    /// Converts the history to the OpenAI request shape: an ordered list of
    /// `{role, content}` records. Does not mutate the history.
    pub fn to_openai_format(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .map(|turn| ChatMessage {
                role: turn.role.as_str().to_string(),
                content: turn.content.clone(),
            })
            .collect()
    }
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_preserves_order() {
        let mut history = ChatHistory::new();
        history.push(Role::User, "hi");
        history.push(Role::Assistant, "hello");
        assert_eq!(history.len(), 2);

        let turns: Vec<&Turn> = history.iter().collect();
        assert_eq!(turns[0], &Turn::user("hi"));
        assert_eq!(turns[1], &Turn::assistant("hello"));
    }

    #[test]
    fn trim_drops_oldest_first() {
        let mut history = ChatHistory::with_max_len(4);
        for i in 0..3 {
            history.push(Role::User, format!("u{i}"));
            history.push(Role::Assistant, format!("a{i}"));
        }
        assert_eq!(history.len(), 6);

        history.trim();
        assert_eq!(history.len(), 4);
        let contents: Vec<&str> = history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["u1", "a1", "u2", "a2"]);
    }

    #[test]
    fn trim_noop_when_under_bound() {
        let mut history = ChatHistory::with_max_len(10);
        history.push(Role::User, "hi");
        history.trim();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn full_history_stays_at_bound() {
        let mut history = ChatHistory::with_max_len(DEFAULT_MAX_HISTORY);
        for i in 0..10 {
            history.push(Role::User, format!("u{i}"));
            history.push(Role::Assistant, format!("a{i}"));
        }
        history.trim();
        assert_eq!(history.len(), 20);

        // One more exchange: length stays at the bound, oldest pair is gone.
        history.push(Role::User, "u10");
        history.push(Role::Assistant, "a10");
        history.trim();
        assert_eq!(history.len(), 20);
        let first = history.iter().next().unwrap();
        assert_eq!(first.content, "u1");
        let last = history.iter().last().unwrap();
        assert_eq!(last.content, "a10");
    }

    #[test]
    fn clear_empties() {
        let mut history = ChatHistory::new();
        history.push(Role::User, "hi");
        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn gemini_format_is_flat_contents() {
        let mut history = ChatHistory::new();
        history.push(Role::User, "U");
        history.push(Role::Assistant, "A");
        assert_eq!(history.to_gemini_format(), vec!["U", "A"]);
        // Conversion must not mutate the history.
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn openai_format_keeps_roles_and_order() {
        let mut history = ChatHistory::new();
        history.push(Role::User, "U");
        history.push(Role::Assistant, "A");

        let messages = history.to_openai_format();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[0].content, "U");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[1].content, "A");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn chat_message_serializes_to_wire_shape() {
        let message = ChatMessage {
            role: "user".to_string(),
            content: "hi".to_string(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }
}
