//! Application settings and configuration
//!
//! Settings are read once at startup from environment variables (and a `.env`
//! file when present) with sensible defaults.

use crate::logging::LogFormat;
use crate::services::adapters::{AdapterConfig, GenerationParams};
use crate::services::backend_pool::{ApiKeyCredential, BackendKind, Cooldowns};
use crate::services::dispatcher::{DispatchConfig, FallbackMessages};
use crate::utils::mask_secret;
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Application environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[value(alias = "dev")]
    Development,
    #[value(alias = "stage")]
    Staging,
    #[value(alias = "prod")]
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => anyhow::bail!("Invalid environment: {}. Expected: development, staging, or production", s),
        }
    }
}

// ============================================================================
// Section Types
// ============================================================================

/// Keys and routing for one backend
#[derive(Clone, Serialize)]
pub struct BackendSettings {
    pub kind: BackendKind,
    /// Ordered; position becomes the resource index
    #[serde(skip_serializing)]
    pub api_keys: Vec<String>,
    /// Lower is preferred
    pub priority: u32,
    pub model: String,
    pub base_url: Option<String>,
    pub organization: Option<String>,
}

impl BackendSettings {
    /// Defaults for a backend with no keys
    pub fn new(kind: BackendKind, priority: u32) -> Self {
        Self {
            kind,
            api_keys: Vec::new(),
            priority,
            model: kind.default_model().to_string(),
            base_url: None,
            organization: None,
        }
    }

    fn from_lookup<F>(kind: BackendKind, default_priority: u32, lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = kind.env_prefix();
        let key_list = non_blank(lookup(&format!("{}_API_KEYS", prefix)))
            .or_else(|| non_blank(lookup(&format!("{}_API_KEY", prefix))))
            .unwrap_or_default();

        Ok(Self {
            kind,
            api_keys: split_keys(&key_list),
            priority: parse_or(lookup, &format!("{}_PRIORITY", prefix), default_priority)?,
            model: non_blank(lookup(&format!("{}_MODEL", prefix)))
                .unwrap_or_else(|| kind.default_model().to_string()),
            base_url: non_blank(lookup(&format!("{}_BASE_URL", prefix))),
            organization: non_blank(lookup(&format!("{}_ORGANIZATION", prefix))),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.api_keys.is_empty()
    }

    /// One named credential per key, in order
    pub fn credentials(&self) -> Vec<ApiKeyCredential> {
        self.api_keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                let credential = ApiKeyCredential::new(key.clone(), format!("{}_key_{}", self.kind, i + 1));
                match &self.organization {
                    Some(org) => credential.with_organization(org.clone()),
                    None => credential,
                }
            })
            .collect()
    }

    pub fn adapter_config(&self, params: GenerationParams) -> AdapterConfig {
        let config = AdapterConfig::for_backend(self.kind)
            .with_model(self.model.clone())
            .with_params(params);
        match &self.base_url {
            Some(url) => config.with_base_url(url.clone()),
            None => config,
        }
    }
}

impl fmt::Debug for BackendSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked: Vec<String> = self.api_keys.iter().map(|k| mask_secret(k)).collect();
        f.debug_struct("BackendSettings")
            .field("kind", &self.kind)
            .field("api_keys", &masked)
            .field("priority", &self.priority)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("organization", &self.organization)
            .finish()
    }
}

/// Attempt budget, cooldowns and timeouts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchSettings {
    pub max_attempts: u32,
    pub short_cooldown_secs: u64,
    pub long_cooldown_secs: u64,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            short_cooldown_secs: 3600,
            long_cooldown_secs: 86400,
            request_timeout_secs: 60,
            connect_timeout_secs: 10,
        }
    }
}

/// Sampling parameters sent to every backend
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: Option<f32>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
            top_p: None,
        }
    }
}

/// Degradation text per terminal cause
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FallbackSettings {
    pub no_backends: String,
    pub all_limited: String,
    pub attempts_exhausted: String,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        let defaults = FallbackMessages::default();
        Self {
            no_backends: defaults.no_backends,
            all_limited: defaults.all_limited,
            attempts_exhausted: defaults.attempts_exhausted,
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

const DEFAULT_PREAMBLE: &str =
    "You are a helpful assistant. Answer clearly and concisely.";

/// Main application settings
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    // App settings
    pub app_name: String,
    pub app_version: String,
    pub environment: Environment,
    pub log_level: String,
    pub log_format: LogFormat,

    // Server settings
    pub host: String,
    pub port: u16,

    // Backends, in declaration order
    pub backends: Vec<BackendSettings>,

    pub dispatch: DispatchSettings,
    pub generation: GenerationSettings,

    // User-facing text
    pub system_preamble: String,
    pub fallback: FallbackSettings,
    pub max_message_chars: usize,
}

impl Settings {
    /// Load settings from environment variables with defaults.
    ///
    /// Not validated here; call [`Settings::validate`] once CLI overrides are
    /// applied.
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignored in production typically)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let mut backends = Vec::with_capacity(BackendKind::ALL.len());
        for (i, kind) in BackendKind::ALL.into_iter().enumerate() {
            backends.push(BackendSettings::from_lookup(kind, i as u32 + 1, &lookup)?);
        }

        Ok(Self {
            app_name: non_blank(lookup("APP_NAME")).unwrap_or(defaults.app_name),
            app_version: defaults.app_version,
            environment: non_blank(lookup("ENVIRONMENT"))
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            log_level: non_blank(lookup("LOG_LEVEL")).unwrap_or(defaults.log_level),
            log_format: match non_blank(lookup("LOG_FORMAT")) {
                Some(v) => v.parse()?,
                None => LogFormat::default(),
            },

            host: non_blank(lookup("HOST")).unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port)?,

            backends,

            dispatch: DispatchSettings {
                max_attempts: parse_or(&lookup, "DISPATCH_MAX_ATTEMPTS", defaults.dispatch.max_attempts)?,
                short_cooldown_secs: parse_or(
                    &lookup,
                    "DISPATCH_SHORT_COOLDOWN_SECS",
                    defaults.dispatch.short_cooldown_secs,
                )?,
                long_cooldown_secs: parse_or(
                    &lookup,
                    "DISPATCH_LONG_COOLDOWN_SECS",
                    defaults.dispatch.long_cooldown_secs,
                )?,
                request_timeout_secs: parse_or(
                    &lookup,
                    "DISPATCH_REQUEST_TIMEOUT_SECS",
                    defaults.dispatch.request_timeout_secs,
                )?,
                connect_timeout_secs: parse_or(
                    &lookup,
                    "DISPATCH_CONNECT_TIMEOUT_SECS",
                    defaults.dispatch.connect_timeout_secs,
                )?,
            },

            generation: GenerationSettings {
                max_tokens: parse_or(&lookup, "GENERATION_MAX_TOKENS", defaults.generation.max_tokens)?,
                temperature: parse_or(&lookup, "GENERATION_TEMPERATURE", defaults.generation.temperature)?,
                top_p: match non_blank(lookup("GENERATION_TOP_P")) {
                    Some(v) => Some(v.parse().context("Invalid GENERATION_TOP_P value")?),
                    None => None,
                },
            },

            system_preamble: non_blank(lookup("SYSTEM_PREAMBLE")).unwrap_or(defaults.system_preamble),
            fallback: FallbackSettings {
                no_backends: non_blank(lookup("FALLBACK_NO_BACKENDS")).unwrap_or(defaults.fallback.no_backends),
                all_limited: non_blank(lookup("FALLBACK_ALL_LIMITED")).unwrap_or(defaults.fallback.all_limited),
                attempts_exhausted: non_blank(lookup("FALLBACK_ATTEMPTS_EXHAUSTED"))
                    .unwrap_or(defaults.fallback.attempts_exhausted),
            },
            max_message_chars: parse_or(&lookup, "MAX_MESSAGE_CHARS", defaults.max_message_chars)?,
        })
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port cannot be 0");
        }

        if self.dispatch.max_attempts == 0 {
            anyhow::bail!("DISPATCH_MAX_ATTEMPTS must be >= 1");
        }
        if self.dispatch.short_cooldown_secs == 0 || self.dispatch.long_cooldown_secs == 0 {
            anyhow::bail!("Dispatch cooldowns must be > 0");
        }
        if self.dispatch.request_timeout_secs == 0 {
            anyhow::bail!("DISPATCH_REQUEST_TIMEOUT_SECS must be > 0");
        }

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            anyhow::bail!("GENERATION_TEMPERATURE must be between 0 and 2");
        }
        if self.max_message_chars == 0 {
            anyhow::bail!("MAX_MESSAGE_CHARS must be > 0");
        }

        if self.total_keys() == 0 {
            tracing::warn!("No backend API keys configured; every reply will be a fallback message");
        }

        Ok(())
    }

    /// Number of API keys across all backends
    pub fn total_keys(&self) -> usize {
        self.backends.iter().map(|b| b.api_keys.len()).sum()
    }

    /// Get the server address string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.generation.max_tokens,
            temperature: Some(self.generation.temperature),
            top_p: self.generation.top_p,
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            max_attempts: self.dispatch.max_attempts,
            cooldowns: Cooldowns::new(self.dispatch.short_cooldown_secs, self.dispatch.long_cooldown_secs),
            request_timeout: Duration::from_secs(self.dispatch.request_timeout_secs),
            preamble: self.system_preamble.clone(),
            fallback: FallbackMessages {
                no_backends: self.fallback.no_backends.clone(),
                all_limited: self.fallback.all_limited.clone(),
                attempts_exhausted: self.fallback.attempts_exhausted.clone(),
            },
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.request_timeout_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "llm-dispatch-gateway".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: Environment::Development,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            host: "0.0.0.0".to_string(),
            port: 8000,
            backends: BackendKind::ALL
                .into_iter()
                .enumerate()
                .map(|(i, kind)| BackendSettings::new(kind, i as u32 + 1))
                .collect(),
            dispatch: DispatchSettings::default(),
            generation: GenerationSettings::default(),
            system_preamble: DEFAULT_PREAMBLE.to_string(),
            fallback: FallbackSettings::default(),
            max_message_chars: 4000,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Comma-separated keys, trimmed, blanks dropped, order kept
fn split_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_blank(lookup(key)) {
        Some(value) => value
            .parse()
            .with_context(|| format!("Invalid {} value: {}", key, value)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(pairs: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_settings() {
        let settings = settings_from(&[]).unwrap();
        assert_eq!(settings.app_name, "llm-dispatch-gateway");
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.dispatch.max_attempts, 3);
        assert_eq!(settings.dispatch.short_cooldown_secs, 3600);
        assert_eq!(settings.dispatch.long_cooldown_secs, 86400);
        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(settings.total_keys(), 0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("development".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("production".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert!("qa".parse::<Environment>().is_err());
    }

    #[test]
    fn test_backend_keys_and_priorities() {
        let settings = settings_from(&[
            ("OPENAI_API_KEYS", "sk-a, sk-b,,sk-c "),
            ("OPENAI_ORGANIZATION", "org-42"),
            ("GEMINI_API_KEY", "AIza-1"),
            ("GEMINI_PRIORITY", "1"),
            ("ANTHROPIC_MODEL", "claude-3-5-sonnet-latest"),
        ])
        .unwrap();

        let openai = &settings.backends[0];
        assert_eq!(openai.api_keys, vec!["sk-a", "sk-b", "sk-c"]);
        assert_eq!(openai.priority, 1);
        let credentials = openai.credentials();
        assert_eq!(credentials[1].name(), "openai_key_2");
        assert_eq!(credentials[1].organization(), Some("org-42"));

        let gemini = &settings.backends[1];
        assert_eq!(gemini.api_keys, vec!["AIza-1"]);
        assert_eq!(gemini.priority, 1);

        let anthropic = &settings.backends[2];
        assert!(!anthropic.is_configured());
        assert_eq!(anthropic.priority, 3);
        assert_eq!(anthropic.model, "claude-3-5-sonnet-latest");
        assert_eq!(settings.total_keys(), 4);
    }

    #[test]
    fn test_key_list_wins_over_single_key() {
        let settings = settings_from(&[("GEMINI_API_KEYS", "k1,k2"), ("GEMINI_API_KEY", "k0")]).unwrap();
        assert_eq!(settings.backends[1].api_keys, vec!["k1", "k2"]);
    }

    #[test]
    fn test_adapter_config_uses_base_url_override() {
        let settings = settings_from(&[("OPENAI_BASE_URL", "https://api.deepseek.com/v1"), ("OPENAI_MODEL", "deepseek-chat")]).unwrap();
        let config = settings.backends[0].adapter_config(settings.generation_params());
        assert_eq!(config.base_url, "https://api.deepseek.com/v1");
        assert_eq!(config.model, "deepseek-chat");
        assert_eq!(config.params.max_tokens, 1024);
    }

    #[test]
    fn test_dispatch_config_mapping() {
        let settings = settings_from(&[
            ("DISPATCH_MAX_ATTEMPTS", "5"),
            ("DISPATCH_SHORT_COOLDOWN_SECS", "60"),
            ("FALLBACK_ALL_LIMITED", "Busy, back soon."),
            ("SYSTEM_PREAMBLE", "You answer questions about our shop."),
        ])
        .unwrap();
        let config = settings.dispatch_config();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.cooldowns.short_secs, 60);
        assert_eq!(config.cooldowns.long_secs, 86400);
        assert_eq!(config.fallback.all_limited, "Busy, back soon.");
        assert_eq!(config.preamble, "You answer questions about our shop.");
    }

    #[test]
    fn test_invalid_numbers_are_errors() {
        assert!(settings_from(&[("PORT", "eighty")]).is_err());
        assert!(settings_from(&[("DISPATCH_MAX_ATTEMPTS", "-1")]).is_err());
        assert!(settings_from(&[("LOG_FORMAT", "xml")]).is_err());
    }

    #[test]
    fn test_validation_rules() {
        for pairs in [
            vec![("PORT", "0")],
            vec![("DISPATCH_MAX_ATTEMPTS", "0")],
            vec![("DISPATCH_LONG_COOLDOWN_SECS", "0")],
            vec![("DISPATCH_REQUEST_TIMEOUT_SECS", "0")],
            vec![("GENERATION_TEMPERATURE", "2.5")],
        ] {
            let settings = settings_from(&pairs).unwrap();
            assert!(settings.validate().is_err(), "expected {:?} to be rejected", pairs);
        }
    }

    #[test]
    fn test_override_before_validation() {
        let mut settings = settings_from(&[("PORT", "0")]).unwrap();
        assert!(settings.validate().is_err());

        settings.port = 8080;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_debug_masks_keys() {
        let settings = settings_from(&[("OPENAI_API_KEY", "sk-very-secret-key-9876")]).unwrap();
        let debug = format!("{:?}", settings.backends[0]);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("9876"));
    }

    #[test]
    fn test_server_addr() {
        let settings = Settings::default();
        assert_eq!(settings.server_addr(), "0.0.0.0:8000");
    }
}
