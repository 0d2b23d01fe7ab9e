//! String utilities
//!
//! Helpers for safe truncation of backend error bodies and for masking
//! secrets before they reach logs or diagnostics.

/// Safely truncate a string at a character boundary
///
/// # Example
/// ```
/// use llm_dispatch_gateway::utils::truncate_str;
///
/// let text = "Hello, 世界!";
/// assert_eq!(truncate_str(text, 8), "Hello, 世");
/// assert_eq!(truncate_str(text, 100), "Hello, 世界!");
/// ```
pub fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Truncate and append a suffix if anything was cut
///
/// # Example
/// ```
/// use llm_dispatch_gateway::utils::truncate_with_suffix;
///
/// assert_eq!(truncate_with_suffix("Hello, World!", 5, "..."), "Hello...");
/// assert_eq!(truncate_with_suffix("Hi", 5, "..."), "Hi");
/// ```
pub fn truncate_with_suffix(s: &str, max_chars: usize, suffix: &str) -> String {
    let truncated = truncate_str(s, max_chars);
    if truncated.len() < s.len() {
        format!("{}{}", truncated, suffix)
    } else {
        s.to_string()
    }
}

/// Mask a secret, keeping only its last four characters
///
/// # Example
/// ```
/// use llm_dispatch_gateway::utils::mask_secret;
///
/// assert_eq!(mask_secret("sk-abcdef123456"), "****3456");
/// assert_eq!(mask_secret("abc"), "****");
/// ```
pub fn mask_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 8 {
        return "****".to_string();
    }
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("****{}", tail)
}
