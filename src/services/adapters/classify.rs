//! Failure classification
//!
//! Maps raw backend failures onto [`FailureKind`]. Explicit signals (HTTP
//! status, error code fields) win over message text; anything unrecognised is
//! `Transient`.

use crate::error::{BackendFailure, FailureKind};
use crate::utils::truncate_with_suffix;
use serde_json::Value;

/// Longest raw error text kept on a failure
const MAX_RAW_CHARS: usize = 512;

const RATE_LIMIT_CODES: &[&str] = &[
    "rate_limit_exceeded",
    "rate_limit_error",
    "rate_limited",
    "insufficient_quota",
    "quota_exceeded",
    "resource_exhausted",
    "too_many_requests",
];

const AUTH_CODES: &[&str] = &[
    "invalid_api_key",
    "api_key_invalid",
    "invalid_authentication",
    "authentication_error",
    "authentication_failed",
    "permission_error",
    "permission_denied",
    "unauthenticated",
    "unauthorized",
];

const RATE_LIMIT_PHRASES: &[&str] = &[
    "rate limit",
    "rate-limit",
    "ratelimit",
    "quota",
    "too many requests",
    "resource exhausted",
    "resource_exhausted",
    "requests per minute",
];

const AUTH_PHRASES: &[&str] = &[
    "unauthorized",
    "unauthenticated",
    "invalid api key",
    "invalid_api_key",
    "incorrect api key",
    "api key not valid",
    "invalid x-api-key",
    "api key expired",
    "permission denied",
    "authentication",
    "forbidden",
];

/// Classify from an HTTP status code alone
pub fn classify_status(status: u16) -> Option<FailureKind> {
    match status {
        429 => Some(FailureKind::RateLimited),
        401 | 403 => Some(FailureKind::AuthFailed),
        _ => None,
    }
}

/// Classify from a backend error code such as `insufficient_quota` or
/// `PERMISSION_DENIED`
pub fn classify_code(code: &str) -> Option<FailureKind> {
    let code = code.trim().to_lowercase();
    if RATE_LIMIT_CODES.contains(&code.as_str()) {
        Some(FailureKind::RateLimited)
    } else if AUTH_CODES.contains(&code.as_str()) {
        Some(FailureKind::AuthFailed)
    } else {
        None
    }
}

/// Classify from free-form error text; unmatched text is `Transient`
pub fn classify_message(message: &str) -> FailureKind {
    let message = message.to_lowercase();
    if RATE_LIMIT_PHRASES.iter().any(|p| message.contains(p)) {
        FailureKind::RateLimited
    } else if AUTH_PHRASES.iter().any(|p| message.contains(p)) {
        FailureKind::AuthFailed
    } else {
        FailureKind::Transient
    }
}

/// Classify a non-success HTTP response.
///
/// Understands the error envelopes of OpenAI (`error.code`, `error.type`),
/// Gemini (`error.status`, `error.details[].reason`) and Anthropic
/// (`error.type`).
pub fn from_http_response(status: u16, body: &str) -> BackendFailure {
    let raw = format!(
        "HTTP {}: {}",
        status,
        truncate_with_suffix(body.trim(), MAX_RAW_CHARS, "...")
    );

    if let Some(kind) = classify_status(status) {
        return BackendFailure::new(kind, raw);
    }

    let envelope: Option<Value> = serde_json::from_str(body).ok();
    let error = envelope.as_ref().map(|v| v.get("error").unwrap_or(v));

    if let Some(error) = error {
        if let Some(kind) = numeric_code(error).and_then(classify_status) {
            return BackendFailure::new(kind, raw);
        }
        if let Some(kind) = error_codes(error).iter().find_map(|code| classify_code(code)) {
            return BackendFailure::new(kind, raw);
        }
        if let Some(message) = error.get("message").and_then(Value::as_str) {
            return BackendFailure::new(classify_message(message), raw);
        }
    }

    BackendFailure::new(classify_message(body), raw)
}

/// Classify a transport-level failure (connect error, timeout, body read)
pub fn from_transport_error(err: &reqwest::Error) -> BackendFailure {
    let raw = if err.is_timeout() {
        format!("request timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        format!("transport error: {}", err)
    };
    BackendFailure::transient(truncate_with_suffix(&raw, MAX_RAW_CHARS, "..."))
}

/// Backend returned 2xx but the body was unusable
pub fn unusable_body(detail: impl std::fmt::Display) -> BackendFailure {
    BackendFailure::transient(truncate_with_suffix(
        &format!("unusable response: {}", detail),
        MAX_RAW_CHARS,
        "...",
    ))
}

/// OpenAI-compatible proxies echo an HTTP status in `error.code`
fn numeric_code(error: &Value) -> Option<u16> {
    error
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
}

fn error_codes(error: &Value) -> Vec<String> {
    let mut codes: Vec<String> = ["code", "type", "status"]
        .iter()
        .filter_map(|field| error.get(*field).and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    if let Some(details) = error.get("details").and_then(Value::as_array) {
        codes.extend(
            details
                .iter()
                .filter_map(|d| d.get("reason").and_then(Value::as_str))
                .map(str::to_string),
        );
    }
    codes
}
