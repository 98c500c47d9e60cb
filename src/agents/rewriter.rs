use std::time::Instant;
use tracing::info;

use super::AgentCore;
use crate::error::{AppResult, LlmError};
use crate::llm::{GenerationOptions, Message};
use crate::prompts::{script_rewriter_prompt, CHANGES_DELIMITER, DEFAULT_CHANGES_SUMMARY};
use crate::types::{BotScript, FailureAnalysis};

const REWRITE_MAX_TOKENS: u32 = 2048;

/// Split a rewrite completion into `(script, changes_summary)`.
///
/// Only the first delimiter counts. With no delimiter, or nothing after it,
/// the summary falls back to a fixed sentence.
pub fn split_rewrite(completion: &str) -> (String, String) {
    match completion.split_once(CHANGES_DELIMITER) {
        Some((script, changes)) if !changes.trim().is_empty() => {
            (script.trim().to_string(), changes.trim().to_string())
        }
        Some((script, _)) => (script.trim().to_string(), DEFAULT_CHANGES_SUMMARY.to_string()),
        None => (
            completion.trim().to_string(),
            DEFAULT_CHANGES_SUMMARY.to_string(),
        ),
    }
}

/// Produces the next script version from the current one and a failure analysis.
pub struct ScriptRewriter {
    core: AgentCore,
}

impl ScriptRewriter {
    /// Create a new script rewriter
    pub fn new(core: AgentCore) -> Self {
        Self { core }
    }

    /// Rewrite `current` into version `current.version + 1`.
    pub async fn rewrite(
        &self,
        current: &BotScript,
        analysis: &FailureAnalysis,
        iteration: u32,
    ) -> AppResult<BotScript> {
        let start = Instant::now();
        info!(
            version = current.version,
            patterns = analysis.patterns.len(),
            iteration,
            "Rewriting script"
        );

        let analysis_json =
            serde_json::to_string_pretty(analysis).map_err(|e| LlmError::InvalidResponse {
                message: format!("Failed to serialize failure analysis: {}", e),
            })?;
        let messages = vec![
            Message::system(script_rewriter_prompt(&current.content, &analysis_json, iteration)),
            Message::user(format!(
                "Rewrite the script now. Output only the new script text, then {} followed by bullet points.",
                CHANGES_DELIMITER
            )),
        ];
        let options = GenerationOptions::with_temperature(self.core.config().temperature_rewrite)
            .with_max_tokens(REWRITE_MAX_TOKENS);

        self.core.pace().await;
        let completion = self.core.generator().generate(&messages, &options).await?;

        let (content, changes_summary) = split_rewrite(&completion);
        if content.is_empty() {
            return Err(LlmError::InvalidResponse {
                message: "Rewrite produced an empty script".to_string(),
            }
            .into());
        }

        let script = current.successor(content, changes_summary);
        info!(
            from = current.version,
            to = script.version,
            chars = script.content.len(),
            latency_ms = start.elapsed().as_millis(),
            "Script rewritten"
        );
        Ok(script)
    }
}
