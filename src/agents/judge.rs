use serde::Deserialize;
use std::time::Instant;
use tracing::info;

use super::AgentCore;
use crate::error::AppResult;
use crate::llm::{generate_json, schema_mismatch, GenerationOptions, Message};
use crate::prompts::JUDGE_PROMPT;
use crate::types::{Conversation, Evaluation, EvaluationMetrics, FailurePoint, Persona};

const MIN_SCORE: f64 = 1.0;
const MAX_SCORE: f64 = 10.0;

/// Judge response. Any `overallScore`/`passed` it carries is ignored.
#[derive(Deserialize)]
struct JudgeVerdict {
    metrics: EvaluationMetrics,
    #[serde(default)]
    failures: Vec<FailurePoint>,
}

/// Scores finished conversations against the two-metric rubric.
pub struct Judge {
    core: AgentCore,
}

impl Judge {
    /// Create a new judge
    pub fn new(core: AgentCore) -> Self {
        Self { core }
    }

    /// Score one conversation held with `persona`.
    pub async fn evaluate(
        &self,
        conversation: &Conversation,
        persona: &Persona,
    ) -> AppResult<Evaluation> {
        let start = Instant::now();
        info!(
            persona_id = %persona.id,
            turns = conversation.total_turns,
            outcome = %conversation.outcome,
            "Evaluating conversation"
        );

        let messages = vec![
            Message::system(JUDGE_PROMPT),
            Message::user(format!(
                "PERSONA DETAILS:\n{}\n\nTRANSCRIPT:\n{}",
                persona_details(persona, conversation),
                conversation.transcript()
            )),
        ];
        let options = GenerationOptions::with_temperature(self.core.config().temperature_evaluation);

        self.core.pace().await;
        let (verdict, completion) =
            generate_json::<JudgeVerdict, _>(self.core.generator(), &messages, &options).await?;

        for (name, score) in [
            ("negotiationEffectiveness", verdict.metrics.negotiation_effectiveness.score),
            ("responseRelevance", verdict.metrics.response_relevance.score),
        ] {
            if !score.is_finite() || !(MIN_SCORE..=MAX_SCORE).contains(&score) {
                return Err(schema_mismatch(
                    format!("{} score {} is outside 1-10", name, score),
                    &completion,
                )
                .into());
            }
        }

        let evaluation = Evaluation::new(&persona.id, verdict.metrics, verdict.failures);
        info!(
            persona_id = %evaluation.persona_id,
            overall = evaluation.overall_score,
            negotiation = evaluation.metrics.negotiation_effectiveness.score,
            relevance = evaluation.metrics.response_relevance.score,
            passed = evaluation.passed,
            failures = evaluation.failures.len(),
            latency_ms = start.elapsed().as_millis(),
            "Evaluation complete"
        );

        Ok(evaluation)
    }
}

fn persona_details(persona: &Persona, conversation: &Conversation) -> String {
    format!(
        "Persona: {} ({} difficulty)\nSituation: {}\nEmotional State: {}\nTactics: {}\nOutcome: {}",
        persona.name,
        persona.difficulty,
        persona.financial_situation,
        persona.emotional_state,
        persona.tactics.join(", "),
        conversation.outcome
    )
}
