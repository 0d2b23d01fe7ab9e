//! Anthropic Messages API adapter

use super::{non_empty, send_json, AdapterConfig, BackendAdapter};
use crate::error::BackendFailure;
use crate::schemas::anthropic::{Message, MessageRequest, MessageResponse, Role as MessageRole};
use crate::schemas::conversation::{Conversation, Role};
use crate::services::backend_pool::{ApiKeyCredential, BackendKind};
use async_trait::async_trait;
use reqwest::Client;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter {
    client: Client,
    config: AdapterConfig,
}

impl AnthropicAdapter {
    pub fn new(client: Client, config: AdapterConfig) -> Self {
        Self { client, config }
    }

    /// The Messages API requires the first message to come from the user, so
    /// leading assistant turns (a greeting, say) are dropped.
    pub fn build_request(&self, conversation: &Conversation) -> MessageRequest {
        let messages = conversation
            .merged_dialogue()
            .into_iter()
            .skip_while(|turn| turn.role != Role::User)
            .map(|turn| Message {
                role: match turn.role {
                    Role::Assistant => MessageRole::Assistant,
                    _ => MessageRole::User,
                },
                content: turn.content,
            })
            .collect();

        let preamble = conversation.preamble();
        MessageRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.params.max_tokens,
            system: (!preamble.trim().is_empty()).then(|| preamble.to_string()),
            messages,
            temperature: self.config.params.temperature,
            top_p: self.config.params.top_p,
        }
    }
}

#[async_trait]
impl BackendAdapter for AnthropicAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Anthropic
    }

    async fn invoke(
        &self,
        conversation: &Conversation,
        credential: &ApiKeyCredential,
    ) -> Result<String, BackendFailure> {
        let url = format!("{}/messages", self.config.endpoint(credential));
        let body = self.build_request(conversation);

        tracing::debug!(
            model = %body.model,
            credential = credential.name(),
            message_count = body.messages.len(),
            "Calling Anthropic messages API"
        );

        let request = self
            .client
            .post(&url)
            .header("x-api-key", credential.api_key())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let response: MessageResponse = send_json(request).await?;
        non_empty(Some(response.text()))
    }
}
