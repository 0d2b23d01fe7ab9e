//! Anthropic Messages API schema definitions

use serde::{Deserialize, Serialize};

// ============================================================================
// Request Types
// ============================================================================

/// Message role; the Messages API has no system role inside `messages`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Request body for `POST /messages`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRequest {
    pub model: String,

    /// Required by the API
    pub max_tokens: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    pub messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

// ============================================================================
// Response Types
// ============================================================================

/// Content block in a response; non-text blocks are ignored
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub content: Vec<ContentBlock>,

    #[serde(default)]
    pub stop_reason: Option<String>,
}

impl MessageResponse {
    /// Concatenated text of all text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text_skips_other_blocks() {
        let body = r#"{"id":"msg_1","type":"message","role":"assistant",
            "content":[{"type":"thinking","thinking":"..."},{"type":"text","text":"Hi there"}],
            "stop_reason":"end_turn"}"#;
        let response: MessageResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.text(), "Hi there");
    }

    #[test]
    fn test_request_system_is_top_level() {
        let request = MessageRequest {
            model: "claude".into(),
            max_tokens: 256,
            system: Some("be nice".into()),
            messages: vec![Message {
                role: Role::User,
                content: "hi".into(),
            }],
            temperature: None,
            top_p: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["system"], "be nice");
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
