//! OpenAI Chat Completions adapter
//!
//! Also serves OpenAI-compatible endpoints (DeepSeek, Groq, local proxies)
//! through a base URL override.

use super::{non_empty, send_json, AdapterConfig, BackendAdapter};
use crate::error::BackendFailure;
use crate::schemas::conversation::{Conversation, Role};
use crate::schemas::openai::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ChatRole};
use crate::services::backend_pool::{ApiKeyCredential, BackendKind};
use async_trait::async_trait;
use reqwest::Client;

pub struct OpenAiAdapter {
    client: Client,
    config: AdapterConfig,
}

impl OpenAiAdapter {
    pub fn new(client: Client, config: AdapterConfig) -> Self {
        Self { client, config }
    }

    /// Translate a conversation into a chat completion request
    pub fn build_request(&self, conversation: &Conversation) -> ChatCompletionRequest {
        let messages = conversation
            .turns()
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    Role::System => ChatRole::System,
                    Role::User => ChatRole::User,
                    Role::Assistant => ChatRole::Assistant,
                };
                ChatMessage::new(role, turn.content.clone())
            })
            .collect();

        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: Some(self.config.params.max_tokens),
            temperature: self.config.params.temperature,
            top_p: self.config.params.top_p,
        }
    }
}

#[async_trait]
impl BackendAdapter for OpenAiAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::OpenAi
    }

    async fn invoke(
        &self,
        conversation: &Conversation,
        credential: &ApiKeyCredential,
    ) -> Result<String, BackendFailure> {
        let url = format!("{}/chat/completions", self.config.endpoint(credential));
        let body = self.build_request(conversation);

        tracing::debug!(
            model = %body.model,
            url = %url,
            credential = credential.name(),
            message_count = body.messages.len(),
            "Calling OpenAI chat completions API"
        );

        let mut request = self
            .client
            .post(&url)
            .bearer_auth(credential.api_key())
            .json(&body);
        if let Some(org) = credential.organization() {
            request = request.header("OpenAI-Organization", org);
        }

        let response: ChatCompletionResponse = send_json(request).await?;
        non_empty(response.first_text().map(str::to_string))
    }
}
