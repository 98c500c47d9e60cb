//! CLI commands.
//!
//! Each command runs one core operation and renders the result as JSON,
//! except `summaries`, which prints a table.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use clap::Subcommand;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info};

use crate::config::EvalConfig;
use crate::error::{AppError, AppResult, StorageError};
use crate::orchestrator::Orchestrator;
use crate::storage::{ArtifactKey, ArtifactKind};
use crate::types::{Conversation, IterationSummary, Persona};

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run iterations until the threshold or the iteration cap is reached
    Run {
        /// First iteration to run
        #[arg(long, default_value = "0")]
        start: u32,

        /// Maximum number of iterations (defaults to MAX_ITERATIONS)
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Personas per iteration (defaults to NUM_PERSONAS)
        #[arg(long)]
        personas: Option<usize>,

        /// Convergence threshold (defaults to SCORE_THRESHOLD)
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Run exactly one iteration
    Iterate {
        /// Iteration number
        #[arg(long, default_value = "0")]
        iteration: u32,

        /// Personas to generate (defaults to NUM_PERSONAS)
        #[arg(long)]
        personas: Option<usize>,

        /// Convergence threshold (defaults to SCORE_THRESHOLD)
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Generate a persona batch without running conversations
    Personas {
        /// Number of personas (defaults to NUM_PERSONAS)
        #[arg(long)]
        count: Option<usize>,
    },

    /// Simulate one conversation against an iteration's script
    Simulate {
        /// Iteration whose script to use
        #[arg(long, default_value = "0")]
        iteration: u32,

        /// Persona JSON file
        #[arg(long, conflicts_with = "persona_id", required_unless_present = "persona_id")]
        persona_file: Option<PathBuf>,

        /// Persona id from the iteration's stored batch
        #[arg(long)]
        persona_id: Option<String>,
    },

    /// Score a conversation
    Evaluate {
        /// Conversation JSON file
        #[arg(long)]
        conversation_file: PathBuf,

        /// Persona JSON file
        #[arg(long)]
        persona_file: PathBuf,
    },

    /// Analyze failures in an iteration's stored evaluations
    Analyze {
        /// Iteration number
        #[arg(long, default_value = "0")]
        iteration: u32,
    },

    /// Rewrite an iteration's script from its stored failure analysis (not persisted)
    Rewrite {
        /// Iteration number
        #[arg(long, default_value = "0")]
        iteration: u32,
    },

    /// List summaries of all completed iterations
    Summaries,

    /// Print a stored artifact
    Show {
        /// Artifact kind: script, personas, conversation, evaluations, summary, failures
        kind: ArtifactKind,

        /// Iteration number
        #[arg(long, default_value = "0")]
        iteration: u32,

        /// Persona id, required for conversations
        #[arg(long)]
        persona_id: Option<String>,
    },
}

/// Result of CLI command execution.
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

impl From<AppResult<String>> for CliResult {
    fn from(result: AppResult<String>) -> Self {
        match result {
            Ok(output) => CliResult::success(output),
            Err(e) => {
                error!(error = %e, "Command failed");
                CliResult::error(format!("Error: {}", e))
            }
        }
    }
}

/// Execute a CLI command.
///
/// `stop` is honoured by `run` between iterations.
pub async fn execute_command(
    command: Commands,
    orchestrator: &Orchestrator,
    config: &EvalConfig,
    stop: &AtomicBool,
) -> CliResult {
    match command {
        Commands::Run {
            start,
            max_iterations,
            personas,
            threshold,
        } => match with_overrides(config, max_iterations, personas, threshold) {
            Ok(loop_config) => {
                execute_run(
                    orchestrator,
                    start,
                    loop_config.max_iterations,
                    loop_config.num_personas,
                    loop_config.threshold,
                    stop,
                )
                .await
            }
            Err(e) => Err::<String, _>(e).into(),
        },
        Commands::Iterate {
            iteration,
            personas,
            threshold,
        } => match with_overrides(config, None, personas, threshold) {
            Ok(loop_config) => execute_iterate(
                orchestrator,
                iteration,
                loop_config.num_personas,
                loop_config.threshold,
            )
            .await
            .into(),
            Err(e) => Err::<String, _>(e).into(),
        },
        Commands::Personas { count } => match with_overrides(config, None, count, None) {
            Ok(loop_config) => execute_personas(orchestrator, loop_config.num_personas)
                .await
                .into(),
            Err(e) => Err::<String, _>(e).into(),
        },
        Commands::Simulate {
            iteration,
            persona_file,
            persona_id,
        } => execute_simulate(orchestrator, iteration, persona_file, persona_id)
            .await
            .into(),
        Commands::Evaluate {
            conversation_file,
            persona_file,
        } => execute_evaluate(orchestrator, &conversation_file, &persona_file)
            .await
            .into(),
        Commands::Analyze { iteration } => execute_analyze(orchestrator, iteration).await.into(),
        Commands::Rewrite { iteration } => execute_rewrite(orchestrator, iteration).await.into(),
        Commands::Summaries => execute_summaries(orchestrator).await.into(),
        Commands::Show {
            kind,
            iteration,
            persona_id,
        } => execute_show(orchestrator, kind, iteration, persona_id)
            .await
            .into(),
    }
}

/// Apply command-line overrides and hold them to the same bounds as the
/// environment settings.
fn with_overrides(
    config: &EvalConfig,
    max_iterations: Option<u32>,
    personas: Option<usize>,
    threshold: Option<f64>,
) -> AppResult<EvalConfig> {
    let overridden = EvalConfig {
        max_iterations: max_iterations.unwrap_or(config.max_iterations),
        num_personas: personas.unwrap_or(config.num_personas),
        threshold: threshold.unwrap_or(config.threshold),
        ..config.clone()
    };
    overridden.validate()?;
    Ok(overridden)
}

async fn execute_run(
    orchestrator: &Orchestrator,
    start: u32,
    max_iterations: u32,
    persona_count: usize,
    threshold: f64,
    stop: &AtomicBool,
) -> CliResult {
    let report = orchestrator
        .run_loop(start, max_iterations, persona_count, threshold, stop)
        .await;

    let mut output = String::new();
    output.push_str(&format_summaries(
        &report
            .results
            .iter()
            .map(|r| r.summary.clone())
            .collect::<Vec<_>>(),
    ));

    match (&report.error, report.stop_reason) {
        (Some(e), _) => {
            output.push_str(&format!("\nRun aborted: {}\n", e));
            CliResult::error(output)
        }
        (None, reason) => {
            let reason = reason
                .and_then(|r| serde_json::to_value(r).ok())
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| "unknown".to_string());
            output.push_str(&format!(
                "\nRun finished after {} iteration(s): {}\n",
                report.results.len(),
                reason
            ));
            CliResult::success(output)
        }
    }
}

async fn execute_iterate(
    orchestrator: &Orchestrator,
    iteration: u32,
    persona_count: usize,
    threshold: f64,
) -> AppResult<String> {
    let result = orchestrator
        .run_iteration(iteration, persona_count, threshold)
        .await?;
    to_json(&result)
}

async fn execute_personas(orchestrator: &Orchestrator, count: usize) -> AppResult<String> {
    let personas = orchestrator.generate_personas(count).await?;
    info!(count = personas.len(), "Personas generated");
    to_json(&personas)
}

async fn execute_simulate(
    orchestrator: &Orchestrator,
    iteration: u32,
    persona_file: Option<PathBuf>,
    persona_id: Option<String>,
) -> AppResult<String> {
    let artifacts = orchestrator.artifacts();
    let persona = match (persona_file, persona_id) {
        (Some(path), _) => read_json::<Persona>(&path).await?,
        (None, Some(id)) => artifacts
            .load_personas(iteration)
            .await?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::Precondition {
                message: format!("No persona '{}' stored for iteration {}", id, iteration),
            })?,
        (None, None) => {
            return Err(AppError::Precondition {
                message: "Either --persona-file or --persona-id is required".to_string(),
            })
        }
    };

    let script = artifacts.load_script(iteration).await?;
    let conversation = orchestrator.simulate_conversation(&script, &persona).await?;
    to_json(&conversation)
}

async fn execute_evaluate(
    orchestrator: &Orchestrator,
    conversation_file: &Path,
    persona_file: &Path,
) -> AppResult<String> {
    let conversation = read_json::<Conversation>(conversation_file).await?;
    let persona = read_json::<Persona>(persona_file).await?;
    let evaluation = orchestrator
        .evaluate_conversation(&conversation, &persona)
        .await?;
    to_json(&evaluation)
}

async fn execute_analyze(orchestrator: &Orchestrator, iteration: u32) -> AppResult<String> {
    let evaluations = orchestrator.artifacts().load_evaluations(iteration).await?;
    if evaluations.is_empty() {
        return Err(AppError::Precondition {
            message: format!("No evaluations found for iteration {}", iteration),
        });
    }
    let analysis = orchestrator.analyze_failures(&evaluations).await?;
    to_json(&analysis)
}

async fn execute_rewrite(orchestrator: &Orchestrator, iteration: u32) -> AppResult<String> {
    let artifacts = orchestrator.artifacts();
    let script = artifacts.load_script(iteration).await?;
    let analysis = artifacts
        .load_failure_analysis(iteration)
        .await?
        .ok_or_else(|| AppError::Precondition {
            message: format!("No failure analysis found for iteration {}", iteration),
        })?;

    let new_script = orchestrator
        .rewrite_script(&script, &analysis, iteration)
        .await?;
    to_json(&new_script)
}

async fn execute_summaries(orchestrator: &Orchestrator) -> AppResult<String> {
    let summaries = orchestrator.artifacts().load_all_summaries().await?;
    Ok(format_summaries(&summaries))
}

async fn execute_show(
    orchestrator: &Orchestrator,
    kind: ArtifactKind,
    iteration: u32,
    persona_id: Option<String>,
) -> AppResult<String> {
    let artifacts = orchestrator.artifacts();
    if kind == ArtifactKind::Script {
        return to_json(&artifacts.load_script(iteration).await?);
    }

    let key = match (kind, persona_id) {
        (ArtifactKind::Conversation, Some(id)) => ArtifactKey::conversation(iteration, id),
        (ArtifactKind::Conversation, None) => {
            return Err(AppError::Precondition {
                message: "--persona-id is required for conversations".to_string(),
            })
        }
        (kind, _) => ArtifactKey::new(iteration, kind),
    };

    let value = artifacts
        .load_raw(&key)
        .await?
        .unwrap_or(serde_json::Value::Null);
    to_json(&value)
}

/// Render summaries as a fixed-width table.
pub fn format_summaries(summaries: &[IterationSummary]) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{:<10} {:<8} {:>8} {:>12} {:>10} {:>10} {:>9}\n",
        "ITERATION", "SCRIPT", "OVERALL", "NEGOTIATION", "RELEVANCE", "PASS RATE", "PERSONAS"
    ));
    output.push_str(&format!("{}\n", "─".repeat(73)));

    if summaries.is_empty() {
        output.push_str("No completed iterations.\n");
        return output;
    }

    for s in summaries {
        output.push_str(&format!(
            "{:<10} {:<8} {:>8.2} {:>12.2} {:>10.2} {:>9.2}% {:>9}\n",
            s.iteration,
            format!("v{}", s.script_version),
            s.avg_overall_score,
            s.avg_negotiation_score,
            s.avg_relevance_score,
            s.pass_rate,
            s.total_personas
        ));
    }
    output
}

fn to_json<T: Serialize>(value: &T) -> AppResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| AppError::Internal {
        message: format!("Failed to serialize output: {}", e),
    })
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> AppResult<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StorageError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    serde_json::from_str(&raw).map_err(|e| {
        StorageError::Malformed {
            key: path.display().to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn summary(iteration: u32, overall: f64) -> IterationSummary {
        IterationSummary {
            iteration,
            script_version: iteration,
            avg_negotiation_score: overall,
            avg_relevance_score: overall,
            avg_overall_score: overall,
            pass_rate: 50.0,
            total_personas: 6,
            failure_patterns: vec![],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_cli_result_success() {
        let result = CliResult::success("ok");
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.message, "ok");
    }

    #[test]
    fn test_cli_result_from_error() {
        let result: CliResult = Err::<String, _>(AppError::Precondition {
            message: "No failure analysis found for iteration 2".to_string(),
        })
        .into();
        assert_eq!(result.exit_code, 1);
        assert!(result.message.contains("iteration 2"));
    }

    #[test]
    fn test_format_summaries_rows() {
        let table = format_summaries(&[summary(0, 5.5), summary(1, 7.75)]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("ITERATION"));
        assert!(lines[2].contains("v0") && lines[2].contains("5.50"));
        assert!(lines[3].contains("v1") && lines[3].contains("7.75") && lines[3].contains("50.00%"));
    }

    #[test]
    fn test_overrides_fall_back_to_config() {
        let config = EvalConfig::default();
        let merged = with_overrides(&config, None, Some(2), None).unwrap();
        assert_eq!(merged.num_personas, 2);
        assert_eq!(merged.max_iterations, config.max_iterations);
        assert_eq!(merged.threshold, config.threshold);
    }

    #[test]
    fn test_overrides_are_validated() {
        let config = EvalConfig::default();
        for (iterations, personas, threshold) in [
            (None, Some(0), None),
            (Some(0), None, None),
            (None, None, Some(0.5)),
            (None, None, Some(11.0)),
        ] {
            let err = with_overrides(&config, iterations, personas, threshold).unwrap_err();
            assert!(matches!(err, AppError::Config { .. }), "{err:?}");
        }
    }

    #[test]
    fn test_format_summaries_empty() {
        assert!(format_summaries(&[]).contains("No completed iterations."));
    }

    #[tokio::test]
    async fn test_read_json_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let err = read_json::<Persona>(&missing).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(StorageError::Io { .. })));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{\"name\": 1}").unwrap();
        let err = read_json::<Persona>(&bad).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(StorageError::Malformed { .. })));
    }
}
