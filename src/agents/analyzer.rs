use std::time::Instant;
use tracing::{debug, info};

use super::AgentCore;
use crate::error::{AppResult, LlmError};
use crate::llm::{generate_json, GenerationOptions, Message};
use crate::prompts::FAILURE_AGGREGATOR_PROMPT;
use crate::types::{Evaluation, FailureAnalysis};

/// Turns a batch of evaluations into recurring failure patterns.
pub struct FailureAnalyzer {
    core: AgentCore,
}

impl FailureAnalyzer {
    /// Create a new failure analyzer
    pub fn new(core: AgentCore) -> Self {
        Self { core }
    }

    /// Find patterns across `evaluations`.
    pub async fn analyze(&self, evaluations: &[Evaluation]) -> AppResult<FailureAnalysis> {
        let start = Instant::now();
        info!(evaluations = evaluations.len(), "Analyzing failures");

        let mut blocks = Vec::with_capacity(evaluations.len());
        for evaluation in evaluations {
            blocks.push(evaluation_block(evaluation)?);
        }

        let messages = vec![
            Message::system(FAILURE_AGGREGATOR_PROMPT),
            Message::user(format!(
                "Here are the evaluation results from this iteration:\n\n{}",
                blocks.join("\n\n")
            )),
        ];
        let options = GenerationOptions::with_temperature(self.core.config().temperature_structured);

        self.core.pace().await;
        let (analysis, _) =
            generate_json::<FailureAnalysis, _>(self.core.generator(), &messages, &options)
                .await?;

        info!(
            patterns = analysis.patterns.len(),
            prioritized_fixes = analysis.prioritized_fixes.len(),
            latency_ms = start.elapsed().as_millis(),
            "Failure analysis complete"
        );
        for pattern in &analysis.patterns {
            debug!(
                pattern = %pattern.pattern,
                severity = ?pattern.severity,
                frequency = %pattern.frequency,
                "Failure pattern"
            );
        }

        Ok(analysis)
    }
}

fn evaluation_block(evaluation: &Evaluation) -> AppResult<String> {
    let failures = serde_json::to_string(&evaluation.failures).map_err(|e| {
        LlmError::InvalidResponse {
            message: format!("Failed to serialize failures: {}", e),
        }
    })?;
    Ok(format!(
        "Persona {}: Overall={}, Negotiation={}, Relevance={}, Passed={}\nFailures: {}",
        evaluation.persona_id,
        evaluation.overall_score,
        evaluation.metrics.negotiation_effectiveness.score,
        evaluation.metrics.response_relevance.score,
        evaluation.passed,
        failures
    ))
}
