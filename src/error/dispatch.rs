//! Dispatch error taxonomy
//!
//! Adapters report a classified [`BackendFailure`]; the dispatcher turns an
//! unsuccessful attempt loop into a [`TerminalCause`]. Neither ever reaches an
//! end user directly.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Classification of a single failed backend invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rate limit or quota signal; short quarantine
    RateLimited,
    /// Credential rejected; long quarantine
    AuthFailed,
    /// Anything else (network, timeout, 5xx, unparseable output); no quarantine
    Transient,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::AuthFailed => "auth_failed",
            Self::Transient => "transient",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure returned by a backend adapter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {raw}")]
pub struct BackendFailure {
    pub kind: FailureKind,
    /// Raw backend detail, for logs only
    pub raw: String,
}

impl BackendFailure {
    pub fn new(kind: FailureKind, raw: impl Into<String>) -> Self {
        Self {
            kind,
            raw: raw.into(),
        }
    }

    pub fn rate_limited(raw: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimited, raw)
    }

    pub fn auth_failed(raw: impl Into<String>) -> Self {
        Self::new(FailureKind::AuthFailed, raw)
    }

    pub fn transient(raw: impl Into<String>) -> Self {
        Self::new(FailureKind::Transient, raw)
    }
}

/// Why a dispatch ended without a successful completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalCause {
    #[error("no backend resources are configured")]
    NoResourcesConfigured,

    #[error("every backend resource is quarantined")]
    PoolExhausted,

    #[error("attempt budget exhausted without a successful completion")]
    AttemptsExhausted,
}
