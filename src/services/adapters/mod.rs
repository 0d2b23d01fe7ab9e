//! Backend adapters
//!
//! One adapter per backend translates a normalized [`Conversation`] into that
//! backend's request shape, performs the call, and returns either the reply
//! text or a classified [`BackendFailure`]. Adapters never return raw
//! transport errors.

pub mod anthropic;
pub mod classify;
pub mod gemini;
pub mod openai;

use crate::error::BackendFailure;
use crate::schemas::conversation::Conversation;
use crate::services::backend_pool::{ApiKeyCredential, BackendKind};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;

// ============================================================================
// Adapter Trait
// ============================================================================

/// A chat-completion backend
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Backend this adapter serves
    fn kind(&self) -> BackendKind;

    /// Submit a conversation using `credential`
    async fn invoke(
        &self,
        conversation: &Conversation,
        credential: &ApiKeyCredential,
    ) -> Result<String, BackendFailure>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Sampling parameters forwarded verbatim to every backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: Some(0.7),
            top_p: None,
        }
    }
}

/// Per-backend adapter configuration
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub model: String,
    /// Default endpoint; a credential's own base URL takes precedence
    pub base_url: String,
    pub params: GenerationParams,
}

impl AdapterConfig {
    /// Defaults for a backend
    pub fn for_backend(kind: BackendKind) -> Self {
        Self {
            model: kind.default_model().to_string(),
            base_url: kind.default_base_url().to_string(),
            params: GenerationParams::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Endpoint root for a call, without a trailing slash
    pub(crate) fn endpoint<'a>(&'a self, credential: &'a ApiKeyCredential) -> &'a str {
        credential
            .base_url()
            .unwrap_or(self.base_url.as_str())
            .trim_end_matches('/')
    }
}

/// Build the shared HTTP client.
///
/// The dispatcher enforces the per-call deadline; the client timeout is a
/// backstop slightly above it.
pub fn build_http_client(
    connect_timeout: Duration,
    request_timeout: Duration,
) -> reqwest::Result<Client> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout + Duration::from_secs(5))
        .build()
}

/// Build the adapter for a backend
pub fn build_adapter(
    kind: BackendKind,
    client: Client,
    config: AdapterConfig,
) -> Arc<dyn BackendAdapter> {
    match kind {
        BackendKind::OpenAi => Arc::new(OpenAiAdapter::new(client, config)),
        BackendKind::Gemini => Arc::new(GeminiAdapter::new(client, config)),
        BackendKind::Anthropic => Arc::new(AnthropicAdapter::new(client, config)),
    }
}

/// Send a prepared request and decode a successful JSON body.
///
/// Every failure path is classified here so adapters only deal with the
/// backend-specific request and response shapes.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
) -> Result<T, BackendFailure> {
    let response = request
        .send()
        .await
        .map_err(|e| classify::from_transport_error(&e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| classify::from_transport_error(&e))?;

    if !status.is_success() {
        return Err(classify::from_http_response(status.as_u16(), &body));
    }

    serde_json::from_str(&body).map_err(classify::unusable_body)
}

/// Reject empty completions so the dispatcher moves on to another resource
pub(crate) fn non_empty(text: Option<String>) -> Result<String, BackendFailure> {
    match text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(classify::unusable_body("empty completion")),
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Adapters keyed by the backend they serve
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<BackendKind, Arc<dyn BackendAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous one for the same backend
    pub fn register(&mut self, adapter: Arc<dyn BackendAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn BackendAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, kind: BackendKind) -> Option<&Arc<dyn BackendAdapter>> {
        self.adapters.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("backends", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// Test Support
// ============================================================================
