//! Iteration orchestration.
//!
//! [`Orchestrator::run_iteration`] sequences one full iteration:
//!
//! ```text
//! load script → personas → {simulate → evaluate} × N → summary
//!     → [avg ≥ threshold? done] → failure analysis → rewrite → script(n+1)
//! ```
//!
//! Every artifact is persisted as soon as it is produced. Any failure
//! aborts the iteration; artifacts already written are left in place and
//! no summary is written for it.
//!
//! [`Orchestrator::run_loop`] issues sequential iterations until the
//! threshold is met, the iteration cap is reached, an error occurs or the
//! stop flag is raised between iterations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agents::{
    AgentCore, ConversationSimulator, FailureAnalyzer, Judge, PersonaGenerator, ScriptRewriter,
};
use crate::config::EvalConfig;
use crate::error::{AppError, AppResult};
use crate::llm::Generator;
use crate::metrics::calculate_summary;
use crate::storage::Artifacts;
use crate::types::{
    BotScript, Conversation, Evaluation, FailureAnalysis, IterationResult, Persona, StopReason,
};

/// Results of a multi-iteration run.
#[derive(Debug)]
pub struct RunReport {
    /// Completed iterations, in order.
    pub results: Vec<IterationResult>,
    /// Why the run stopped; `None` when it stopped on an error.
    pub stop_reason: Option<StopReason>,
    /// The error that aborted the run, if any.
    pub error: Option<AppError>,
}

/// Runs iterations over the agents and the artifact store.
pub struct Orchestrator {
    personas: PersonaGenerator,
    simulator: ConversationSimulator,
    judge: Judge,
    analyzer: FailureAnalyzer,
    rewriter: ScriptRewriter,
    artifacts: Artifacts,
}

impl Orchestrator {
    /// Create an orchestrator whose agents share `generator` and `config`.
    pub fn new(generator: Arc<dyn Generator>, config: EvalConfig, artifacts: Artifacts) -> Self {
        let core = AgentCore::new(generator, config);
        Self {
            personas: PersonaGenerator::new(core.clone()),
            simulator: ConversationSimulator::new(core.clone()),
            judge: Judge::new(core.clone()),
            analyzer: FailureAnalyzer::new(core.clone()),
            rewriter: ScriptRewriter::new(core),
            artifacts,
        }
    }

    /// The artifact store
    pub fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    /// Generate `count` personas.
    pub async fn generate_personas(&self, count: usize) -> AppResult<Vec<Persona>> {
        self.personas.generate(count).await
    }

    /// Simulate one conversation.
    pub async fn simulate_conversation(
        &self,
        script: &BotScript,
        persona: &Persona,
    ) -> AppResult<Conversation> {
        self.simulator.simulate(script, persona).await
    }

    /// Score one conversation.
    pub async fn evaluate_conversation(
        &self,
        conversation: &Conversation,
        persona: &Persona,
    ) -> AppResult<Evaluation> {
        self.judge.evaluate(conversation, persona).await
    }

    /// Find failure patterns across evaluations.
    pub async fn analyze_failures(&self, evaluations: &[Evaluation]) -> AppResult<FailureAnalysis> {
        self.analyzer.analyze(evaluations).await
    }

    /// Produce the next script version.
    pub async fn rewrite_script(
        &self,
        script: &BotScript,
        analysis: &FailureAnalysis,
        iteration: u32,
    ) -> AppResult<BotScript> {
        self.rewriter.rewrite(script, analysis, iteration).await
    }

    /// Run one iteration and report whether to continue.
    pub async fn run_iteration(
        &self,
        iteration: u32,
        persona_count: usize,
        threshold: f64,
    ) -> AppResult<IterationResult> {
        if persona_count == 0 {
            return Err(AppError::Precondition {
                message: "An iteration needs at least one persona".to_string(),
            });
        }
        let start = Instant::now();
        info!(iteration, persona_count, threshold, "Iteration started");

        info!(iteration, "Step 1/8: loading script");
        let script = self.artifacts.load_script(iteration).await?;
        info!(
            iteration,
            version = script.version,
            chars = script.content.len(),
            "Script loaded"
        );

        info!(iteration, "Step 2/8: persisting script");
        self.artifacts.save_script(iteration, &script).await?;

        info!(iteration, persona_count, "Step 3/8: generating personas");
        let personas = self.personas.generate(persona_count).await?;
        self.artifacts.save_personas(iteration, &personas).await?;

        info!(iteration, personas = personas.len(), "Step 4/8: conversations and evaluations");
        let mut evaluations = Vec::with_capacity(personas.len());
        for (i, persona) in personas.iter().enumerate() {
            info!(
                iteration,
                persona_id = %persona.id,
                index = i + 1,
                total = personas.len(),
                difficulty = %persona.difficulty,
                "Processing persona"
            );

            let conversation = self.simulator.simulate(&script, persona).await?;
            self.artifacts
                .save_conversation(iteration, &conversation)
                .await?;

            let evaluation = self.judge.evaluate(&conversation, persona).await?;
            info!(
                iteration,
                persona_id = %persona.id,
                overall = evaluation.overall_score,
                passed = evaluation.passed,
                "Persona scored"
            );
            evaluations.push(evaluation);
        }

        info!(iteration, "Step 5/8: persisting evaluations");
        self.artifacts
            .save_evaluations(iteration, &evaluations)
            .await?;

        info!(iteration, "Step 6/8: calculating summary");
        let summary = calculate_summary(&evaluations, iteration, script.version);
        self.artifacts.save_summary(&summary).await?;
        info!(
            iteration,
            overall = summary.avg_overall_score,
            negotiation = summary.avg_negotiation_score,
            relevance = summary.avg_relevance_score,
            pass_rate = summary.pass_rate,
            "Summary saved"
        );

        info!(
            iteration,
            overall = summary.avg_overall_score,
            threshold,
            "Step 7/8: checking threshold"
        );
        if summary.avg_overall_score >= threshold {
            info!(
                iteration,
                latency_ms = start.elapsed().as_millis(),
                "Iteration finished, threshold met"
            );
            return Ok(IterationResult {
                done: true,
                reason: Some(StopReason::ThresholdMet),
                summary,
                next_iteration: None,
            });
        }

        info!(iteration, "Step 8/8: analyzing failures and rewriting script");
        let analysis = self.analyzer.analyze(&evaluations).await?;
        self.artifacts
            .save_failure_analysis(iteration, &analysis)
            .await?;

        let next = iteration + 1;
        let new_script = self.rewriter.rewrite(&script, &analysis, iteration).await?;
        self.artifacts.save_script(next, &new_script).await?;

        info!(
            iteration,
            next_iteration = next,
            new_version = new_script.version,
            latency_ms = start.elapsed().as_millis(),
            "Iteration finished, below threshold"
        );
        Ok(IterationResult {
            done: false,
            reason: None,
            summary,
            next_iteration: Some(next),
        })
    }

    /// Run up to `max_iterations` iterations starting at `start`.
    ///
    /// `stop` is checked only between iterations; an in-flight iteration
    /// always runs to completion or failure.
    pub async fn run_loop(
        &self,
        start: u32,
        max_iterations: u32,
        persona_count: usize,
        threshold: f64,
        stop: &AtomicBool,
    ) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", run_id = %run_id);

        async move {
            info!(start, max_iterations, persona_count, threshold, "Run started");
            let mut results: Vec<IterationResult> = Vec::new();

            for iteration in start..start.saturating_add(max_iterations) {
                if stop.load(Ordering::SeqCst) {
                    warn!(iteration, "Stop requested, not starting iteration");
                    return RunReport {
                        results,
                        stop_reason: Some(StopReason::Stopped),
                        error: None,
                    };
                }

                match self.run_iteration(iteration, persona_count, threshold).await {
                    Ok(result) => {
                        let done = result.done;
                        results.push(result);
                        if done {
                            info!(iteration, "Run finished, threshold met");
                            return RunReport {
                                results,
                                stop_reason: Some(StopReason::ThresholdMet),
                                error: None,
                            };
                        }
                    }
                    Err(e) => {
                        error!(iteration, error = %e, "Iteration failed, stopping run");
                        return RunReport {
                            results,
                            stop_reason: None,
                            error: Some(e),
                        };
                    }
                }
            }

            if let Some(last) = results.last_mut() {
                last.reason = Some(StopReason::MaxIterations);
            }
            info!(completed = results.len(), "Run finished, iteration cap reached");
            RunReport {
                results,
                stop_reason: Some(StopReason::MaxIterations),
                error: None,
            }
        }
        .instrument(span)
        .await
    }
}
