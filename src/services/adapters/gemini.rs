//! Google Gemini adapter
//!
//! Calls `models/{model}:generateContent` with the API key in the
//! `x-goog-api-key` header.

use super::{non_empty, send_json, AdapterConfig, BackendAdapter};
use crate::error::BackendFailure;
use crate::schemas::conversation::{Conversation, Role};
use crate::schemas::gemini::{GeminiContent, GeminiRequest, GeminiResponse, GenerationConfig};
use crate::services::backend_pool::{ApiKeyCredential, BackendKind};
use async_trait::async_trait;
use reqwest::Client;

pub struct GeminiAdapter {
    client: Client,
    config: AdapterConfig,
}

impl GeminiAdapter {
    pub fn new(client: Client, config: AdapterConfig) -> Self {
        Self { client, config }
    }

    /// Gemini wants alternating user/model turns opening with the user, and
    /// the preamble as a separate system instruction.
    pub fn build_request(&self, conversation: &Conversation) -> GeminiRequest {
        let contents = conversation
            .merged_dialogue()
            .into_iter()
            .skip_while(|turn| turn.role != Role::User)
            .map(|turn| match turn.role {
                Role::Assistant => GeminiContent::model(turn.content),
                _ => GeminiContent::user(turn.content),
            })
            .collect();

        let preamble = conversation.preamble();
        let system_instruction = (!preamble.trim().is_empty()).then(|| GeminiContent::system(preamble));

        GeminiRequest {
            contents,
            system_instruction,
            generation_config: Some(GenerationConfig {
                temperature: self.config.params.temperature,
                top_p: self.config.params.top_p,
                max_output_tokens: Some(self.config.params.max_tokens),
            }),
        }
    }
}

#[async_trait]
impl BackendAdapter for GeminiAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Gemini
    }

    async fn invoke(
        &self,
        conversation: &Conversation,
        credential: &ApiKeyCredential,
    ) -> Result<String, BackendFailure> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.endpoint(credential),
            self.config.model
        );
        let body = self.build_request(conversation);

        tracing::debug!(
            model = %self.config.model,
            credential = credential.name(),
            content_count = body.contents.len(),
            "Calling Gemini generateContent API"
        );

        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", credential.api_key())
            .json(&body);

        let response: GeminiResponse = send_json(request).await?;
        if response.candidates.is_empty() {
            if let Some(feedback) = &response.prompt_feedback {
                tracing::warn!(feedback = %feedback, "Gemini returned no candidates");
            }
        }
        non_empty(response.first_text())
    }
}
