//! Generation capability: message types, the [`Generator`] seam, the Groq
//! client, and structured-JSON decoding of completions.

mod client;
mod types;

pub use client::GroqClient;
pub use types::*;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::error;

use crate::error::{LlmError, LlmResult};

/// Characters of a raw completion kept in diagnostics.
pub const RAW_PREVIEW_CHARS: usize = 500;

/// Stateless request/response text generation.
///
/// Implementations own their retry policy; callers see a single result.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion for the given message history.
    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> LlmResult<String>;
}

/// Generate a completion and decode it as a single JSON value of type `T`.
///
/// Returns the decoded value with the raw completion, so callers that
/// validate further can still report what the model sent. Text that is not
/// JSON fails with [`LlmError::Unparseable`]; JSON of the wrong shape fails
/// with [`LlmError::SchemaMismatch`]. Neither is retried.
pub async fn generate_json<T, G>(
    generator: &G,
    messages: &[Message],
    options: &GenerationOptions,
) -> LlmResult<(T, String)>
where
    T: DeserializeOwned,
    G: Generator + ?Sized,
{
    let completion = generator.generate(messages, options).await?;
    let value = parse_structured(&completion)?;
    Ok((value, completion))
}

/// Decode a completion as `T`, stripping code fences first.
pub fn parse_structured<T: DeserializeOwned>(completion: &str) -> LlmResult<T> {
    let json = extract_json_from_completion(completion).map_err(|message| {
        error!(raw = %truncate_raw(completion), "No JSON in completion");
        LlmError::Unparseable {
            message,
            raw: truncate_raw(completion),
        }
    })?;

    let value: serde_json::Value = serde_json::from_str(json).map_err(|e| {
        error!(error = %e, raw = %truncate_raw(json), "JSON parse failed");
        LlmError::Unparseable {
            message: e.to_string(),
            raw: truncate_raw(json),
        }
    })?;

    serde_json::from_value(value).map_err(|e| {
        error!(error = %e, raw = %truncate_raw(json), "JSON does not match expected shape");
        schema_mismatch(e.to_string(), json)
    })
}

/// Build a [`LlmError::SchemaMismatch`] carrying a truncated raw preview.
pub fn schema_mismatch(message: impl Into<String>, raw: &str) -> LlmError {
    LlmError::SchemaMismatch {
        message: message.into(),
        raw: truncate_raw(raw),
    }
}

/// Truncate a raw completion for error messages and logs.
pub fn truncate_raw(raw: &str) -> String {
    raw.chars().take(RAW_PREVIEW_CHARS).collect()
}

/// Extract JSON from a completion string, handling markdown code blocks.
///
/// Attempts extraction in this order:
/// 1. Raw JSON (fast path)
/// 2. ```json ... ``` code blocks
/// 3. ``` ... ``` code blocks
pub(crate) fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    if completion.contains("```json") {
        return completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ```json block but content was empty or malformed".to_string());
    }

    if completion.contains("```") {
        return completion
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ``` block but content was empty or malformed".to_string());
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Score {
        score: f64,
    }

    #[test]
    fn test_extract_json_raw_object() {
        let result = extract_json_from_completion(r#"{"key": "value"}"#);
        assert_eq!(result.unwrap(), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_raw_array_with_whitespace() {
        let result = extract_json_from_completion("  \n [1, 2, 3] \n");
        assert_eq!(result.unwrap(), "[1, 2, 3]");
    }

    #[test]
    fn test_extract_json_from_json_code_block() {
        let input = "Here you go:\n```json\n{\"result\": true}\n```\nDone.";
        assert_eq!(
            extract_json_from_completion(input).unwrap(),
            r#"{"result": true}"#
        );
    }

    #[test]
    fn test_extract_json_from_plain_code_block() {
        let input = "```\n[{\"id\": 1}]\n```";
        assert_eq!(extract_json_from_completion(input).unwrap(), r#"[{"id": 1}]"#);
    }

    #[test]
    fn test_extract_json_empty_block() {
        let result = extract_json_from_completion("```json\n\n```");
        assert!(result.unwrap_err().contains("empty or malformed"));
    }

    #[test]
    fn test_extract_json_no_json_found() {
        let result = extract_json_from_completion("I cannot help with that.");
        assert!(result.unwrap_err().contains("No JSON found"));
    }

    #[test]
    fn test_parse_structured_fenced() {
        let parsed: Score = parse_structured("```json\n{\"score\": 7.5}\n```").unwrap();
        assert_eq!(parsed, Score { score: 7.5 });
    }

    #[test]
    fn test_parse_structured_distinguishes_unparseable_from_schema_mismatch() {
        let err = parse_structured::<Score>("{not json").unwrap_err();
        assert!(matches!(err, LlmError::Unparseable { .. }), "{err:?}");

        let err = parse_structured::<Score>(r#"{"points": 7}"#).unwrap_err();
        assert!(matches!(err, LlmError::SchemaMismatch { .. }), "{err:?}");

        let err = parse_structured::<Score>("plain prose").unwrap_err();
        assert!(matches!(err, LlmError::Unparseable { .. }), "{err:?}");
    }

    #[test]
    fn test_truncate_raw_limits_length() {
        let long = "x".repeat(2_000);
        assert_eq!(truncate_raw(&long).len(), RAW_PREVIEW_CHARS);
        assert_eq!(truncate_raw("short"), "short");
    }

    #[tokio::test]
    async fn test_generate_json_uses_generator_output() {
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .times(1)
            .returning(|_, _| Ok("{\"score\": 9}".to_string()));

        let (parsed, raw): (Score, String) = generate_json(
            &generator,
            &[Message::user("score it")],
            &GenerationOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(parsed.score, 9.0);
        assert_eq!(raw, "{\"score\": 9}");
    }

    #[tokio::test]
    async fn test_generate_json_propagates_generator_error() {
        let mut generator = MockGenerator::new();
        generator.expect_generate().times(1).returning(|_, _| {
            Err(LlmError::Api {
                status: 500,
                message: "down".to_string(),
            })
        });

        let result: LlmResult<(Score, String)> =
            generate_json(&generator, &[], &GenerationOptions::default()).await;
        assert!(matches!(result, Err(LlmError::Api { status: 500, .. })));
    }
}
