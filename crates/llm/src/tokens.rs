//! Token Estimation
//!
//! Cheap, provider-independent token estimates and per-model context limits.
//! Estimates are character based; they only need to be conservative enough
//! to keep a prompt under the window, not exact.

use crate::types::Message;

/// Context window used when the model family is not recognised.
pub const DEFAULT_CONTEXT_LIMIT: u32 = 32_000;

/// Approximate characters per token for a model family.
fn chars_per_token(model: &str) -> f64 {
    if model.to_lowercase().contains("claude") {
        3.5
    } else {
        4.0
    }
}

/// Estimate the token cost of `text` for `model`.
pub fn estimate_tokens(text: &str, model: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    let chars = text.chars().count() as f64;
    let estimate = (chars / chars_per_token(model)).ceil();
    estimate.min(u32::MAX as f64) as u32
}

/// Character budget that stays within `tokens` for `model`.
pub fn chars_for_tokens(tokens: u32, model: &str) -> usize {
    (tokens as f64 * chars_per_token(model)).floor() as usize
}

/// Estimate the token cost of a message list, including a small per-message overhead.
pub fn estimate_message_tokens(messages: &[Message], model: &str) -> u32 {
    messages
        .iter()
        .map(|m| estimate_tokens(&m.plain_text(), model).saturating_add(4))
        .fold(0u32, |acc, t| acc.saturating_add(t))
}

/// Context window size in tokens for `model`.
///
/// Matching is by case-insensitive family substring, most specific first.
pub fn context_limit(model: &str) -> u32 {
    let m = model.to_lowercase();
    const TABLE: &[(&str, u32)] = &[
        ("claude", 200_000),
        ("gpt-4o", 128_000),
        ("gpt-4.1", 128_000),
        ("gpt-4-turbo", 128_000),
        ("o1", 200_000),
        ("o3", 200_000),
        ("gpt-4", 8_192),
        ("gpt-3.5", 16_385),
        ("deepseek", 64_000),
        ("qwen", 32_768),
        ("llama", 8_192),
        ("mistral", 32_000),
    ];
    TABLE
        .iter()
        .find(|(family, _)| m.contains(family))
        .map(|(_, limit)| *limit)
        .unwrap_or(DEFAULT_CONTEXT_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_is_zero() {
        assert_eq!(estimate_tokens("", "gpt-4o"), 0);
    }

    #[test]
    fn test_chars_for_tokens_inverts_estimate() {
        let chars = chars_for_tokens(100, "claude-sonnet-4");
        assert_eq!(chars, 350);
        assert!(estimate_tokens(&"x".repeat(chars), "claude-sonnet-4") <= 100);
    }

    #[test]
    fn test_estimate_rounds_up() {
        assert_eq!(estimate_tokens("abcde", "gpt-4o"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(400), "gpt-4o"), 100);
    }

    #[test]
    fn test_claude_ratio_is_denser() {
        let text = "y".repeat(700);
        assert_eq!(estimate_tokens(&text, "claude-sonnet-4"), 200);
        assert!(estimate_tokens(&text, "claude-sonnet-4") > estimate_tokens(&text, "gpt-4o"));
    }

    #[test]
    fn test_context_limit_table() {
        assert_eq!(context_limit("claude-3-5-sonnet-20241022"), 200_000);
        assert_eq!(context_limit("gpt-4o-mini"), 128_000);
        assert_eq!(context_limit("GPT-4"), 8_192);
        assert_eq!(context_limit("gpt-3.5-turbo"), 16_385);
        assert_eq!(context_limit("deepseek-chat"), 64_000);
        assert_eq!(context_limit("qwen2.5-coder"), 32_768);
        assert_eq!(context_limit("some-local-model"), DEFAULT_CONTEXT_LIMIT);
    }

    #[test]
    fn test_message_overhead() {
        let messages = vec![Message::user("abcd"), Message::assistant("abcd")];
        assert_eq!(estimate_message_tokens(&messages, "gpt-4o"), 10);
    }
}
