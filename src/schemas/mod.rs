//! Schema module
//!
//! The normalized conversation model plus the wire shapes of each backend.

pub mod anthropic;
pub mod conversation;
pub mod gemini;
pub mod openai;

pub use conversation::{ChatTurn, Conversation, Role};
