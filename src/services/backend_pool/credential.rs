//! Credentials and dispatchable resources
//!
//! A [`Resource`] binds one [`ApiKeyCredential`] to one [`BackendKind`] and
//! carries its health. A [`ResourceHandle`] is the cheap, lock-free view the
//! dispatcher holds while a call is in flight.

use super::health::HealthState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// ============================================================================
// Backend Kind
// ============================================================================

/// Supported chat-completion backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// OpenAI, or any OpenAI-compatible endpoint through a base URL override
    OpenAi,
    Gemini,
    Anthropic,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [Self::OpenAi, Self::Gemini, Self::Anthropic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Anthropic => "anthropic",
        }
    }

    /// Prefix of this backend's environment variables
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI",
            Self::Gemini => "GEMINI",
            Self::Anthropic => "ANTHROPIC",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Gemini => "gemini-2.0-flash",
            Self::Anthropic => "claude-3-5-haiku-20241022",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Self::Anthropic => "https://api.anthropic.com/v1",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "gemini" | "google" => Ok(Self::Gemini),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            _ => anyhow::bail!("Unknown backend: {}. Expected: openai, gemini, or anthropic", s),
        }
    }
}

// ============================================================================
// API Key Credential
// ============================================================================

/// API key credential for a chat-completion backend
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKeyCredential {
    /// Credential name for identification in logs
    name: String,
    /// The API key
    api_key: String,
    /// Optional organization ID (OpenAI)
    organization: Option<String>,
    /// Optional base URL override
    base_url: Option<String>,
}

impl ApiKeyCredential {
    pub fn new(api_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            organization: None,
            base_url: None,
        }
    }

    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.organization = Some(org.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn organization(&self) -> Option<&str> {
        self.organization.as_deref()
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }
}

// Keep the key out of Debug output so it never lands in logs.
impl fmt::Debug for ApiKeyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyCredential")
            .field("name", &self.name)
            .field("api_key", &crate::utils::mask_secret(&self.api_key))
            .field("organization", &self.organization)
            .field("base_url", &self.base_url)
            .finish()
    }
}

// ============================================================================
// Resource
// ============================================================================

/// One credential bound to one backend, the unit of health tracking
#[derive(Debug, Clone)]
pub struct Resource {
    /// `"<backend>#<index>"`
    pub id: String,
    pub backend: BackendKind,
    /// Position of the credential within its backend's key list
    pub index: usize,
    /// Lower is preferred
    pub priority: u32,
    pub credential: Arc<ApiKeyCredential>,
    pub health: HealthState,
}

impl Resource {
    pub fn handle(&self) -> ResourceHandle {
        ResourceHandle {
            id: self.id.clone(),
            backend: self.backend,
            index: self.index,
            credential: Arc::clone(&self.credential),
        }
    }
}

/// Snapshot of a selected resource, safe to hold across an await point
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    pub id: String,
    pub backend: BackendKind,
    pub index: usize,
    pub credential: Arc<ApiKeyCredential>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_credential() {
        let cred = ApiKeyCredential::new("sk-test-key-123456", "openai_key_1")
            .with_organization("org-1")
            .with_base_url("https://proxy.local/v1");
        assert_eq!(cred.name(), "openai_key_1");
        assert_eq!(cred.api_key(), "sk-test-key-123456");
        assert_eq!(cred.organization(), Some("org-1"));
        assert_eq!(cred.base_url(), Some("https://proxy.local/v1"));
    }

    #[test]
    fn test_debug_masks_key() {
        let cred = ApiKeyCredential::new("sk-very-secret-value", "k");
        let debug = format!("{:?}", cred);
        assert!(!debug.contains("sk-very-secret-value"));
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("OpenAI".parse::<BackendKind>().unwrap(), BackendKind::OpenAi);
        assert_eq!("gemini".parse::<BackendKind>().unwrap(), BackendKind::Gemini);
        assert_eq!("claude".parse::<BackendKind>().unwrap(), BackendKind::Anthropic);
        assert!("bedrock".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Gemini.to_string(), "gemini");
    }
}
