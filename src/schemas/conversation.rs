//! Normalized conversation model
//!
//! Every backend adapter consumes a [`Conversation`]. The system preamble is
//! always its first and only system turn; callers cannot inject their own.

use serde::{Deserialize, Serialize};

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single turn in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Conversation sent to a backend for one dispatch call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    turns: Vec<ChatTurn>,
}

impl Conversation {
    /// Build `preamble + history + user_message`.
    ///
    /// System turns in `history` are dropped so the preamble appears exactly once.
    pub fn build(preamble: &str, history: &[ChatTurn], user_message: &str) -> Self {
        let mut turns = Vec::with_capacity(history.len() + 2);
        turns.push(ChatTurn::new(Role::System, preamble));
        turns.extend(
            history
                .iter()
                .filter(|turn| turn.role != Role::System)
                .cloned(),
        );
        turns.push(ChatTurn::user(user_message));
        Self { turns }
    }

    /// The system preamble
    pub fn preamble(&self) -> &str {
        self.turns
            .first()
            .map(|turn| turn.content.as_str())
            .unwrap_or_default()
    }

    /// All turns, preamble included
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// User and assistant turns, in order
    pub fn dialogue(&self) -> impl Iterator<Item = &ChatTurn> {
        self.turns.iter().filter(|turn| turn.role != Role::System)
    }

    /// Dialogue with consecutive same-role turns joined by a blank line.
    ///
    /// Gemini and Anthropic reject two adjacent turns from the same speaker.
    pub fn merged_dialogue(&self) -> Vec<ChatTurn> {
        let mut merged: Vec<ChatTurn> = Vec::new();
        for turn in self.dialogue() {
            match merged.last_mut() {
                Some(last) if last.role == turn.role => {
                    last.content.push_str("\n\n");
                    last.content.push_str(&turn.content);
                }
                _ => merged.push(turn.clone()),
            }
        }
        merged
    }
}
