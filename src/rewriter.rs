//! Query rewriter (C7): LLM-mediated intent extraction with robust JSON
//! recovery, since the generator returns free-form text that is only
//! expected to contain a JSON object, not guaranteed to be one.

use crate::generator::{Generator, SamplingParams};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::warn;

fn braces_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("static pattern is valid"))
}

fn fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"```json\s*|```").expect("static pattern is valid"))
}

/// Robustly extract a JSON object from free-form generator output.
/// Returns an empty object on total failure; callers treat that as "no rewrite".
pub fn robust_json_parse(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }

    let stripped = fence_pattern().replace_all(raw.trim(), "");
    let stripped = stripped.trim().to_string();

    let mut candidate = stripped.clone();
    if !candidate.starts_with('{') {
        candidate = format!("{{{candidate}");
    }

    if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
        return value;
    }

    // Scan the pre-prepend text for the fallback match, so the artificial
    // leading brace never contaminates a balanced embedded object.
    if let Some(m) = braces_pattern().find(&stripped) {
        let escaped = m.as_str().replace('\n', "\\n");
        if let Ok(value) = serde_json::from_str::<Value>(&escaped) {
            return value;
        }
    }

    warn!(raw, "query rewrite output was not recoverable JSON, falling back to empty object");
    Value::Object(Default::default())
}

/// `rewrite(user_text) -> search_words`, falling back to `user_text`
/// verbatim on any backend failure or unrecoverable JSON.
pub async fn rewrite_query(
    generator: &dyn Generator,
    user_text: &str,
    sampling: SamplingParams,
) -> String {
    let prompt = format!(
        "Extract the core search intent from the following user message and \
         respond with a JSON object of the form {{\"search_words\": \"...\"}}.\n\nMessage: {user_text}"
    );

    let raw = match generator.generate(&prompt, sampling).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "query rewrite backend call failed, falling back to raw text");
            return user_text.to_string();
        }
    };

    let parsed = robust_json_parse(&raw);
    parsed
        .get("search_words")
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .unwrap_or_else(|| user_text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::fakes::FakeGenerator;

    #[test]
    fn test_robust_json_parse_strips_fence() {
        let input = "foo ```json\n{\"a\":1}\n``` bar";
        let value = robust_json_parse(input);
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_robust_json_parse_prepends_missing_brace() {
        let input = "\"search_words\": \"hello\"}";
        let value = robust_json_parse(input);
        assert_eq!(value["search_words"], "hello");
    }

    #[test]
    fn test_robust_json_parse_returns_empty_object_on_total_failure() {
        let value = robust_json_parse("no json here");
        assert_eq!(value, Value::Object(Default::default()));
    }

    #[tokio::test]
    async fn test_rewrite_falls_back_to_raw_text_when_unrecoverable() {
        let generator = FakeGenerator {
            response: "no json here".to_string(),
        };
        let sampling = SamplingParams {
            temperature: 0.01,
            top_p: 0.1,
            max_tokens: 512,
        };
        let result = rewrite_query(&generator, "合同成立", sampling).await;
        assert_eq!(result, "合同成立");
    }

    #[tokio::test]
    async fn test_rewrite_uses_search_words_when_present() {
        let generator = FakeGenerator {
            response: "{\"search_words\": \"contract formation\"}".to_string(),
        };
        let sampling = SamplingParams {
            temperature: 0.01,
            top_p: 0.1,
            max_tokens: 512,
        };
        let result = rewrite_query(&generator, "合同成立", sampling).await;
        assert_eq!(result, "contract formation");
    }
}
