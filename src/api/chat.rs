//! Chat endpoint
//!
//! POST /v1/chat takes a user message plus prior turns and always answers
//! `200` with displayable text. Only malformed requests are errors.

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ApiError;
use crate::schemas::conversation::ChatTurn;
use crate::server::state::AppState;

/// Request body for POST /v1/chat
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, message = "message must not be empty"))]
    pub message: String,

    #[serde(default)]
    #[validate(length(max = 100, message = "history is limited to 100 turns"))]
    pub history: Vec<ChatTurn>,
}

/// Response body for POST /v1/chat
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatResponse {
    pub reply: String,
    /// True when `reply` is a fallback message rather than a model completion
    pub degraded: bool,
}

/// POST /v1/chat
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::InvalidRequest(rejection.body_text()))?;
    request.validate()?;

    if request.message.trim().is_empty() {
        return Err(ApiError::InvalidRequest("message must not be blank".to_string()));
    }
    let max_chars = state.settings.max_message_chars;
    if request.message.chars().count() > max_chars {
        return Err(ApiError::InvalidRequest(format!(
            "message exceeds {} characters",
            max_chars
        )));
    }

    tracing::debug!(
        history_turns = request.history.len(),
        message_chars = request.message.chars().count(),
        "Dispatching chat request"
    );

    let outcome = state.dispatcher.send(&request.message, &request.history).await;
    let degraded = !outcome.is_success();

    Ok(Json(ChatResponse {
        reply: outcome.into_text(),
        degraded,
    }))
}
