//! Token usage from observation output
//!
//! Instrumented LLM calls attach `_llm_tokens`, `_llm_messages` and
//! `_llm_result` to the observation output. Reported counts win; when no
//! positive total is reported the counts are estimated from word counts.

use serde_json::Value;

/// Token counts for one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt: i64,
    pub completion: i64,
    pub total: i64,
    /// Counts came from the word-count estimator
    pub estimated: bool,
}

/// Read reported usage from `output`, or estimate it
///
/// Returns `None` when the output carries neither usage nor LLM text.
pub fn extract_token_usage(output: &Value) -> Option<TokenUsage> {
    let output = output.as_object()?;

    if let Some(reported) = output.get("_llm_tokens").and_then(reported_usage) {
        return Some(reported);
    }

    let prompt_text = output.get("_llm_messages").map(messages_text);
    let completion_text = output.get("_llm_result").map(result_text);
    if prompt_text.is_none() && completion_text.is_none() {
        return None;
    }

    let prompt = estimate_tokens(prompt_text.as_deref().unwrap_or_default());
    let completion = estimate_tokens(completion_text.as_deref().unwrap_or_default());
    if prompt + completion == 0 {
        return None;
    }

    tracing::debug!(prompt, completion, "Estimated token usage from text");
    Some(TokenUsage {
        prompt,
        completion,
        total: prompt + completion,
        estimated: true,
    })
}

/// `{total, prompt, completion}` or the `*_tokens` aliases; `None` unless
/// the total is positive
fn reported_usage(tokens: &Value) -> Option<TokenUsage> {
    let count = |short: &str, long: &str| {
        tokens
            .get(short)
            .or_else(|| tokens.get(long))
            .and_then(Value::as_i64)
    };

    let prompt = count("prompt", "prompt_tokens");
    let completion = count("completion", "completion_tokens");
    let total = count("total", "total_tokens").or_else(|| match (prompt, completion) {
        (None, None) => None,
        (p, c) => Some(p.unwrap_or(0) + c.unwrap_or(0)),
    })?;

    if total <= 0 {
        return None;
    }
    Some(TokenUsage {
        prompt: prompt.unwrap_or(0),
        completion: completion.unwrap_or(0),
        total,
        estimated: false,
    })
}

/// Concatenated `content` of every message
fn messages_text(messages: &Value) -> String {
    let Some(messages) = messages.as_array() else {
        return String::new();
    };
    messages
        .iter()
        .filter_map(|m| m.get("content"))
        .map(result_text)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strings as-is, anything else as rendered JSON
fn result_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// About 0.75 tokens per whitespace-separated word, rounded up
fn estimate_tokens(text: &str) -> i64 {
    let words = text.split_whitespace().count() as i64;
    (words * 3 + 3) / 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reported_tokens() {
        let output = json!({"_llm_tokens": {"total": 200, "prompt": 150, "completion": 50}});
        assert_eq!(
            extract_token_usage(&output),
            Some(TokenUsage {
                prompt: 150,
                completion: 50,
                total: 200,
                estimated: false
            })
        );
    }

    #[test]
    fn test_reported_token_aliases() {
        let output = json!({"_llm_tokens": {"prompt_tokens": 10, "completion_tokens": 5}});
        let usage = extract_token_usage(&output).unwrap();
        assert_eq!(usage.total, 15);
        assert!(!usage.estimated);
    }

    #[test]
    fn test_zero_total_falls_back_to_estimate() {
        let output = json!({
            "_llm_tokens": {"total": 0, "prompt": null, "completion": null},
            "_llm_messages": [
                {"role": "system", "content": "you are helpful"},
                {"role": "user", "content": "what is the weather today"}
            ],
            "_llm_result": "sunny and warm"
        });
        let usage = extract_token_usage(&output).unwrap();
        // 8 prompt words -> 6, 3 completion words -> 3 (rounded up)
        assert_eq!(usage.prompt, 6);
        assert_eq!(usage.completion, 3);
        assert_eq!(usage.total, 9);
        assert!(usage.estimated);
    }

    #[test]
    fn test_structured_result_is_rendered() {
        let output = json!({"_llm_result": {"answer": "yes"}});
        let usage = extract_token_usage(&output).unwrap();
        assert_eq!(usage.prompt, 0);
        assert!(usage.completion > 0);
        assert!(usage.estimated);
    }

    #[test]
    fn test_no_usage_data() {
        assert_eq!(extract_token_usage(&json!({"answer": 42})), None);
        assert_eq!(extract_token_usage(&json!("plain string")), None);
        assert_eq!(extract_token_usage(&json!({"_llm_result": ""})), None);
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("one"), 1);
        assert_eq!(estimate_tokens("one two three four"), 3);
        assert_eq!(estimate_tokens("  spaced\tout\nwords  "), 3);
    }
}
